//! Transfer engine: the single owner of the lftp session.
//!
//! Every operation takes the command mutex, so exactly one command/response
//! cycle is in flight at a time. Each cycle is bounded by the command timeout;
//! a timeout or a broken console marks the session broken and surfaces as
//! [`EngineError::Connection`]. The next operation restarts the console and
//! replays the recorded setup before running its own command.

pub(crate) mod command;
mod error;
mod session;

#[cfg(test)]
pub(crate) mod fake;

use std::time::Duration;

use tokio::sync::Mutex;

use crate::job_status::JobStatus;
use crate::status_parser::{self, ParsedStatus};

pub use error::{EngineError, SessionError};
pub use session::{CommandOutput, LftpProcess, Session};

/// Login details for the remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub address: String,
    pub port: u16,
    pub username: String,
    /// Ignored (sent empty) when `use_ssh_key` is set.
    pub password: String,
    pub use_ssh_key: bool,
}

/// Concurrency limits lftp enforces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_parallel_downloads: u32,
    pub max_files_per_download: u32,
    pub max_connections_per_root_file: u32,
    pub max_connections_per_dir_file: u32,
    /// 0 = unlimited.
    pub max_total_connections: u32,
    pub use_temp_file: bool,
}

/// Per-job parallelism for `start_mirror` / `start_pget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Files fetched in parallel (mirror only).
    pub parallel_files: u32,
    /// Connections per file.
    pub connections_per_file: u32,
}

struct EngineInner {
    session: Box<dyn Session>,
    broken: bool,
    /// `set` commands by key, replayed in order after a restart.
    settings: Vec<(String, String)>,
    open: Option<String>,
}

pub struct TransferEngine {
    inner: Mutex<EngineInner>,
    timeout: Duration,
}

impl TransferEngine {
    pub fn new(session: Box<dyn Session>, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                session,
                broken: false,
                settings: Vec::new(),
                open: None,
            }),
            timeout,
        }
    }

    /// Apply transfer settings and open the connection to the remote server.
    pub async fn configure(
        &self,
        credentials: &RemoteCredentials,
        limits: &ConnectionLimits,
    ) -> Result<(), EngineError> {
        validate_credentials(credentials)?;
        validate_limits(limits)?;

        let mut inner = self.inner.lock().await;
        let settings = [
            ("xfer:use-temp-file", command::yes_no(limits.use_temp_file).to_string()),
            ("net:timeout", "20".to_string()),
            ("net:max-retries", "2".to_string()),
            ("net:reconnect-interval-base", "3".to_string()),
            ("sftp:auto-confirm", "yes".to_string()),
            ("cmd:queue-parallel", limits.max_parallel_downloads.to_string()),
            (
                "mirror:parallel-transfer-count",
                limits.max_files_per_download.to_string(),
            ),
            ("pget:default-n", limits.max_connections_per_root_file.to_string()),
            ("mirror:use-pget-n", limits.max_connections_per_dir_file.to_string()),
            ("net:connection-limit", limits.max_total_connections.to_string()),
        ];
        for (key, value) in settings {
            self.apply_setting(&mut inner, key, value).await?;
        }

        let password = if credentials.use_ssh_key {
            ""
        } else {
            credentials.password.as_str()
        };
        let open = command::open(
            &credentials.address,
            credentials.port,
            &credentials.username,
            password,
        );
        let output = self.execute(&mut inner, &open).await?;
        let reply = command_reply(&output.stderr);
        if !reply.is_empty() {
            return Err(EngineError::Command {
                operation: "open",
                message: reply,
            });
        }
        inner.open = Some(open);
        tracing::info!(
            address = %credentials.address,
            port = credentials.port,
            "lftp session configured"
        );
        Ok(())
    }

    /// Queue a directory transfer. Returns once lftp has accepted it into its queue.
    pub async fn start_mirror(
        &self,
        remote_path: &str,
        local_path: &str,
        options: &TransferOptions,
    ) -> Result<(), EngineError> {
        validate_options(options)?;
        let cmd = command::queue_mirror(
            remote_path,
            local_path,
            options.parallel_files,
            options.connections_per_file,
        );
        self.submit("mirror", &cmd).await
    }

    /// Queue a single-file parallel transfer of `remote_path` to the file `local_path`.
    pub async fn start_pget(
        &self,
        remote_path: &str,
        local_path: &str,
        options: &TransferOptions,
    ) -> Result<(), EngineError> {
        validate_options(options)?;
        let cmd = command::queue_pget(remote_path, local_path, options.connections_per_file);
        self.submit("pget", &cmd).await
    }

    /// Remove a job. Cancelling a job lftp no longer knows about is not an error.
    pub async fn cancel(&self, job_id: i64) -> Result<(), EngineError> {
        if job_id < 0 {
            return Err(EngineError::Command {
                operation: "kill",
                message: "job has no id assigned yet".to_string(),
            });
        }
        let mut inner = self.inner.lock().await;
        let output = self.execute(&mut inner, &command::kill(job_id)).await?;
        let reply = command_reply(&output.stderr);
        if reply.is_empty() || reply.to_ascii_lowercase().contains("no such job") {
            tracing::debug!(job_id, "cancelled lftp job");
            return Ok(());
        }
        Err(EngineError::Command {
            operation: "kill",
            message: reply,
        })
    }

    /// Delete commands still waiting in lftp's queue that transfer `remote_path`.
    /// Matching nothing is not an error.
    pub async fn dequeue(&self, remote_path: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let output = self.execute(&mut inner, &command::dequeue(remote_path)).await?;
        let reply = command_reply(&output.stderr);
        let lower = reply.to_ascii_lowercase();
        if reply.is_empty() || lower.contains("no queued") || lower.contains("no such") {
            tracing::debug!(remote_path, "removed queued lftp command");
            return Ok(());
        }
        Err(EngineError::Command {
            operation: "queue --delete",
            message: reply,
        })
    }

    /// Current lftp jobs. Unreadable blocks are dropped (and logged) by the parser.
    pub async fn query_status(&self) -> Result<Vec<JobStatus>, EngineError> {
        self.poll_status().await.map(ParsedStatus::into_jobs)
    }

    /// Like [`query_status`](Self::query_status), but keeps the ids of blocks
    /// that could not be read so callers can tell "gone" from "unreadable".
    pub async fn poll_status(&self) -> Result<ParsedStatus, EngineError> {
        let mut inner = self.inner.lock().await;
        let output = self.execute(&mut inner, command::JOBS).await?;
        let reply = command_reply(&output.stderr);
        if !reply.is_empty() {
            tracing::debug!("jobs -v stderr: {}", reply);
        }
        Ok(status_parser::parse(&output.stdout))
    }

    /// Reconfigure the concurrency limits lftp enforces.
    pub async fn set_parallelism(
        &self,
        max_total: u32,
        max_per_job_files: u32,
        max_per_job_connections: u32,
    ) -> Result<(), EngineError> {
        if max_total == 0 || max_per_job_files == 0 || max_per_job_connections == 0 {
            return Err(EngineError::Config(
                "parallelism limits must be greater than 0".to_string(),
            ));
        }
        let mut inner = self.inner.lock().await;
        self.apply_setting(&mut inner, "cmd:queue-parallel", max_total.to_string())
            .await?;
        self.apply_setting(
            &mut inner,
            "mirror:parallel-transfer-count",
            max_per_job_files.to_string(),
        )
        .await?;
        self.apply_setting(
            &mut inner,
            "mirror:use-pget-n",
            max_per_job_connections.to_string(),
        )
        .await?;
        self.apply_setting(&mut inner, "pget:default-n", max_per_job_connections.to_string())
            .await
    }

    /// Close the session once any in-flight command has finished.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.session.close().await;
        inner.broken = true;
        tracing::debug!("lftp session closed");
    }

    async fn submit(&self, operation: &'static str, cmd: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let output = self.execute(&mut inner, cmd).await?;
        let reply = command_reply(&output.stderr);
        if !reply.is_empty() {
            return Err(EngineError::Command {
                operation,
                message: reply,
            });
        }
        Ok(())
    }

    async fn apply_setting(
        &self,
        inner: &mut EngineInner,
        key: &str,
        value: String,
    ) -> Result<(), EngineError> {
        let output = self.execute(inner, &command::set(key, &value)).await?;
        let reply = command_reply(&output.stderr);
        if !reply.is_empty() {
            return Err(EngineError::Command {
                operation: "set",
                message: reply,
            });
        }
        match inner.settings.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => inner.settings.push((key.to_string(), value)),
        }
        Ok(())
    }

    /// One bounded command/response cycle, restarting a broken session first.
    async fn execute(&self, inner: &mut EngineInner, cmd: &str) -> Result<CommandOutput, EngineError> {
        if inner.broken {
            self.recover(inner).await?;
        }
        self.run_bounded(inner, cmd).await
    }

    async fn run_bounded(&self, inner: &mut EngineInner, cmd: &str) -> Result<CommandOutput, EngineError> {
        match tokio::time::timeout(self.timeout, inner.session.run(cmd)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                inner.broken = true;
                Err(EngineError::Connection(e.to_string()))
            }
            Err(_) => {
                inner.broken = true;
                Err(EngineError::Connection(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    async fn recover(&self, inner: &mut EngineInner) -> Result<(), EngineError> {
        tracing::info!("restarting lftp session");
        match tokio::time::timeout(self.timeout, inner.session.restart()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Connection(e.to_string())),
            Err(_) => {
                return Err(EngineError::Connection("session restart timed out".to_string()))
            }
        }
        inner.broken = false;

        let mut replay: Vec<String> = inner
            .settings
            .iter()
            .map(|(k, v)| command::set(k, v))
            .collect();
        replay.extend(inner.open.clone());
        for cmd in replay {
            self.run_bounded(inner, &cmd).await?;
        }
        Ok(())
    }
}

fn validate_credentials(c: &RemoteCredentials) -> Result<(), EngineError> {
    if c.address.trim().is_empty() || c.address.contains(char::is_whitespace) {
        return Err(EngineError::Config(format!(
            "invalid remote address `{}`",
            c.address
        )));
    }
    if c.port == 0 {
        return Err(EngineError::Config(format!("invalid remote port {}", c.port)));
    }
    if c.username.trim().is_empty() {
        return Err(EngineError::Config("remote username is empty".to_string()));
    }
    if !c.use_ssh_key && c.password.is_empty() {
        return Err(EngineError::Config(
            "remote password is empty and ssh key auth is off".to_string(),
        ));
    }
    Ok(())
}

/// Transfer commands whose messages come from background jobs, never from
/// the console command that happened to be running.
const JOB_REPORT_PREFIXES: [&str; 3] = ["mirror:", "pget:", "get:"];

fn is_job_report(line: &str) -> bool {
    if JOB_REPORT_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return true;
    }
    // `[3] Done (mirror ...)` style job notices.
    line.strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
        .is_some_and(|(id, _)| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

/// The part of a command's stderr that is the command's own reply. Background
/// job reports are logged and left out.
fn command_reply(stderr: &str) -> String {
    let mut reply = Vec::new();
    for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_job_report(line) {
            tracing::warn!("lftp: {}", line);
        } else {
            reply.push(line);
        }
    }
    reply.join("\n")
}

fn validate_limits(l: &ConnectionLimits) -> Result<(), EngineError> {
    let positive = [
        ("max_parallel_downloads", l.max_parallel_downloads),
        ("max_files_per_download", l.max_files_per_download),
        ("max_connections_per_root_file", l.max_connections_per_root_file),
        ("max_connections_per_dir_file", l.max_connections_per_dir_file),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(EngineError::Config(format!("{} must be greater than 0", name)));
        }
    }
    Ok(())
}

fn validate_options(o: &TransferOptions) -> Result<(), EngineError> {
    if o.parallel_files == 0 || o.connections_per_file == 0 {
        return Err(EngineError::Config(
            "transfer parallelism must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
