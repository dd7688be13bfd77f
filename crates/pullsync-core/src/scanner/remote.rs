//! Remote listing through a one-shot `lftp -c` run.
//!
//! The script runs `du` for recursive directory sizes, echoes a marker line,
//! then runs `cls` for the top-level listing. `cls` runs last so its status is
//! the status of the run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ListingError, RemoteEntry, RemoteLister};
use crate::engine::command;
use crate::engine::RemoteCredentials;
use crate::model::ItemKind;

const LISTING_MARKER: &str = "__pullsync_listing__";

pub struct LftpRemoteLister {
    program: PathBuf,
    credentials: RemoteCredentials,
    remote_path: String,
    timeout: Duration,
}

impl LftpRemoteLister {
    pub fn new(
        program: impl Into<PathBuf>,
        credentials: RemoteCredentials,
        remote_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            credentials,
            remote_path: remote_path.into(),
            timeout,
        }
    }

    pub(crate) fn script(&self) -> String {
        let c = &self.credentials;
        let password = if c.use_ssh_key { "" } else { c.password.as_str() };
        let dir = format!("{}/", self.remote_path.trim_end_matches('/'));
        let dir = command::quote(&dir);
        format!(
            "set sftp:auto-confirm yes; {}; du -d 1 --block-size=1 {}; echo {}; \
             cls -1 --classify -s --block-size=1 {}",
            command::open(&c.address, c.port, &c.username, password),
            dir,
            LISTING_MARKER,
            dir
        )
    }
}

#[async_trait]
impl RemoteLister for LftpRemoteLister {
    async fn list(&self) -> Result<Vec<RemoteEntry>, ListingError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--norc")
            .arg("-c")
            .arg(self.script())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ListingError::Timeout(self.timeout.as_millis()))?
            .map_err(|source| ListingError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ListingError::Command {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let entries =
            parse_remote_output(&String::from_utf8_lossy(&output.stdout), &self.remote_path)?;
        tracing::debug!(count = entries.len(), "remote listing");
        Ok(entries)
    }
}

/// Parse `cls -1 --classify -s --block-size=1` output: `<size> <name>[/|@]` per line.
pub fn parse_listing(text: &str) -> Result<Vec<RemoteEntry>, ListingError> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.trim_end().is_empty() {
            continue;
        }
        let malformed = || ListingError::Malformed(line.to_string());
        let (size, rest) = trimmed.split_once(char::is_whitespace).ok_or_else(malformed)?;
        let size: u64 = size.parse().map_err(|_| malformed())?;
        let rest = rest.trim_start();

        let (path, kind) = match rest.strip_suffix('/') {
            Some(dir) => (dir, ItemKind::Directory),
            None => (rest.strip_suffix('@').unwrap_or(rest), ItemKind::File),
        };
        let name = path.rsplit('/').next().unwrap_or(path);
        if name.is_empty() {
            return Err(malformed());
        }
        if name == "." || name == ".." {
            continue;
        }
        let size = match kind {
            ItemKind::File => Some(size),
            // cls reports the inode size; content sizes come from du.
            ItemKind::Directory => None,
        };
        entries.push(RemoteEntry::new(name, kind, size));
    }
    Ok(entries)
}

/// Split the output of [`LftpRemoteLister`]'s script and give each listed
/// directory the recursive size `du` reported for it.
pub fn parse_remote_output(text: &str, root: &str) -> Result<Vec<RemoteEntry>, ListingError> {
    let lines: Vec<&str> = text.lines().collect();
    let split = lines
        .iter()
        .position(|l| l.trim() == LISTING_MARKER)
        .ok_or_else(|| ListingError::Malformed(format!("no {} line in output", LISTING_MARKER)))?;
    let sizes = parse_tree_sizes(&lines[..split].join("\n"), root);
    let mut entries = parse_listing(&lines[split + 1..].join("\n"))?;
    for entry in entries.iter_mut().filter(|e| e.kind == ItemKind::Directory) {
        entry.size = sizes.get(&entry.name).copied();
        if entry.size.is_none() {
            tracing::debug!(name = %entry.name, "no du size for remote directory");
        }
    }
    Ok(entries)
}

/// Parse `du -d 1 --block-size=1` output (`<size>\t<path>` per line) into
/// sizes keyed by the last path component. The line for `root` itself and
/// unreadable lines are skipped.
pub fn parse_tree_sizes(text: &str, root: &str) -> HashMap<String, u64> {
    let root = root.trim_end_matches('/');
    let mut sizes = HashMap::new();
    for line in text.lines() {
        let Some((size, path)) = line.split_once('\t') else {
            continue;
        };
        let Ok(size) = size.trim().parse::<u64>() else {
            continue;
        };
        let path = path.trim_end_matches('/');
        if path == root || path.is_empty() || path == "." {
            continue;
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        sizes.insert(name.to_string(), size);
    }
    sizes
}
