//! Archive extraction invoked after a confirmed download.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::model::ItemKind;

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".zip", ".rar", ".7z", ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz",
    ".gz", ".bz2", ".xz",
];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no archive found in {0}")]
    NoArchive(PathBuf),
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("extracting {archive} failed ({status}): {stderr}")]
    Failed {
        archive: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Case-insensitive archive suffix check.
pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if is_secondary_rar_volume(&lower) {
        return false;
    }
    ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// `x.part2.rar` and later volumes are pulled in by extracting `x.part1.rar`.
fn is_secondary_rar_volume(lower: &str) -> bool {
    let Some(stem) = lower.strip_suffix(".rar") else {
        return false;
    };
    match stem.rsplit_once(".part") {
        Some((_, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            n.trim_start_matches('0') != "1"
        }
        _ => false,
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether `path` (a downloaded item of `kind`) holds anything to extract.
    async fn is_extractable(&self, path: &Path, kind: ItemKind) -> bool;

    /// Extract every archive in `path` into `dest`.
    async fn extract(&self, path: &Path, kind: ItemKind, dest: &Path) -> Result<(), ExtractError>;
}

/// Runs `7z x -y -o<dest> <archive>` for each archive.
pub struct CommandExtractor {
    program: PathBuf,
}

impl CommandExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        let mut dest_arg = std::ffi::OsString::from("-o");
        dest_arg.push(dest);
        let output = Command::new(&self.program)
            .arg("x")
            .arg("-y")
            .arg(dest_arg)
            .arg(archive)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExtractError::Failed {
                archive: archive.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::debug!(archive = %archive.display(), dest = %dest.display(), "extracted");
        Ok(())
    }
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::new("7z")
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn is_extractable(&self, path: &Path, kind: ItemKind) -> bool {
        match kind {
            ItemKind::File => path
                .file_name()
                .map(|n| is_archive_name(&n.to_string_lossy()))
                .unwrap_or(false),
            ItemKind::Directory => match find_archives(path).await {
                Ok(found) => !found.is_empty(),
                Err(e) => {
                    tracing::warn!("scanning {} for archives: {}", path.display(), e);
                    false
                }
            },
        }
    }

    async fn extract(&self, path: &Path, kind: ItemKind, dest: &Path) -> Result<(), ExtractError> {
        let archives = match kind {
            ItemKind::File => vec![path.to_path_buf()],
            ItemKind::Directory => find_archives(path).await?,
        };
        if archives.is_empty() {
            return Err(ExtractError::NoArchive(path.to_path_buf()));
        }
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|source| ExtractError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        for archive in &archives {
            self.run(archive, dest).await?;
        }
        Ok(())
    }
}

/// Archives anywhere below `root`, sorted by path.
pub async fn find_archives(root: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let io_err = |source| ExtractError::Io {
            path: dir.clone(),
            source,
        };
        let mut rd = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        while let Some(entry) = rd.next_entry().await.map_err(io_err)? {
            let file_type = entry.file_type().await.map_err(io_err)?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() && is_archive_name(&entry.file_name().to_string_lossy()) {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}
