//! Console session to an `lftp` child process.
//!
//! lftp reads commands from a piped stdin. Each command is followed by the
//! same marker written to both streams (`!echo <marker> 1>&2`, then
//! `echo <marker>`), so a command's output ends at the marker on stdout and
//! its messages at the marker on stderr. Stderr is read by a background task
//! and handed over through a channel.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use super::error::SessionError;

const EXIT_WAIT: Duration = Duration::from_secs(2);

/// Output of one command/response cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A strictly request/response console. Implementations are driven by one
/// caller at a time ([`super::TransferEngine`] holds the only handle).
#[async_trait]
pub trait Session: Send {
    /// Run one command and return its full output.
    async fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Drop any existing console and start a fresh one.
    async fn restart(&mut self) -> Result<(), SessionError>;

    /// Terminate the console. Further `run` calls fail until `restart`.
    async fn close(&mut self);
}

struct Console {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_rx: mpsc::UnboundedReceiver<String>,
}

/// [`Session`] backed by a local `lftp` process.
pub struct LftpProcess {
    program: PathBuf,
    console: Option<Console>,
    marker_seq: u64,
}

impl LftpProcess {
    /// Spawn `program` (normally `lftp`).
    pub fn spawn(program: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let mut process = Self {
            program: program.into(),
            console: None,
            marker_seq: 0,
        };
        process.console = Some(process.start_console()?);
        Ok(process)
    }

    fn start_console(&self) -> Result<Console, SessionError> {
        let mut child = Command::new(&self.program)
            .arg("--norc")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(SessionError::Closed)?;
        let stdout = child.stdout.take().ok_or(SessionError::Closed)?;
        let stderr = child.stderr.take().ok_or(SessionError::Closed)?;

        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(line).is_err() {
                    break;
                }
            }
        });

        tracing::debug!(pid = ?child.id(), "lftp console started");
        Ok(Console {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr_rx,
        })
    }

    fn next_marker(&mut self) -> String {
        self.marker_seq += 1;
        format!("__pullsync_done_{}__", self.marker_seq)
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

#[async_trait]
impl Session for LftpProcess {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let marker = self.next_marker();
        let console = self.console.as_mut().ok_or(SessionError::Closed)?;

        // Messages from background jobs that arrived between commands.
        for line in drain(&mut console.stderr_rx) {
            tracing::warn!("lftp: {}", line);
        }

        let payload = format!("{}\n!echo {} 1>&2\necho {}\n", command, marker, marker);
        console.stdin.write_all(payload.as_bytes()).await?;
        console.stdin.flush().await?;

        let mut stdout = Vec::new();
        loop {
            match console.stdout.next_line().await? {
                None => return Err(SessionError::Closed),
                Some(line) if line == marker => break,
                Some(line) => stdout.push(line),
            }
        }
        let mut stderr = Vec::new();
        loop {
            match console.stderr_rx.recv().await {
                None => return Err(SessionError::Closed),
                Some(line) if line == marker => break,
                Some(line) => stderr.push(line),
            }
        }

        Ok(CommandOutput {
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
        })
    }

    async fn restart(&mut self) -> Result<(), SessionError> {
        self.close().await;
        self.console = Some(self.start_console()?);
        Ok(())
    }

    async fn close(&mut self) {
        let Some(mut console) = self.console.take() else {
            return;
        };
        let _ = console.stdin.write_all(b"exit kill\n").await;
        let _ = console.stdin.flush().await;
        drop(console.stdin);
        match tokio::time::timeout(EXIT_WAIT, console.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "lftp console exited"),
            _ => {
                tracing::debug!("lftp console did not exit in time, killing");
                let _ = console.child.kill().await;
            }
        }
    }
}
