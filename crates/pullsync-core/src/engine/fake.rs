//! Scripted in-memory session for engine and controller tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{CommandOutput, Session, SessionError};

#[derive(Default)]
struct FakeState {
    commands: Vec<String>,
    jobs_dump: String,
    rejections: Vec<(String, String)>,
    disconnects: Vec<String>,
    fail_next: usize,
    hang: bool,
    delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
    restarts: usize,
    closed: bool,
    /// `done <command>` when a command returns, `close` when the session is closed.
    events: Vec<String>,
}

/// Session half handed to the engine.
pub(crate) struct FakeLftp {
    state: Arc<Mutex<FakeState>>,
}

/// Test-side handle to script responses and inspect issued commands.
#[derive(Clone)]
pub(crate) struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

pub(crate) fn fake_lftp() -> (FakeLftp, FakeHandle) {
    let state = Arc::new(Mutex::new(FakeState::default()));
    (
        FakeLftp {
            state: Arc::clone(&state),
        },
        FakeHandle { state },
    )
}

impl FakeHandle {
    pub fn set_jobs(&self, dump: &str) {
        self.state.lock().unwrap().jobs_dump = dump.to_string();
    }

    /// Commands containing `needle` answer with `stderr`.
    pub fn reject(&self, needle: &str, stderr: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .push((needle.to_string(), stderr.to_string()));
    }

    /// Commands containing `needle` fail as if the console died.
    pub fn disconnect_on(&self, needle: &str) {
        self.state.lock().unwrap().disconnects.push(needle.to_string());
    }

    pub fn clear_rejections(&self) {
        let mut s = self.state.lock().unwrap();
        s.rejections.clear();
        s.disconnects.clear();
    }

    /// The next `n` commands fail as if the console died.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn hang(&self, hang: bool) {
        self.state.lock().unwrap().hang = hang;
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn restarts(&self) -> usize {
        self.state.lock().unwrap().restarts
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl Session for FakeLftp {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let (hang, delay) = {
            let mut s = self.state.lock().unwrap();
            s.commands.push(command.to_string());
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            (s.hang, s.delay)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.state.lock().unwrap();
        s.in_flight -= 1;
        s.events.push(format!("done {}", command));
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(SessionError::Closed);
        }
        if s.disconnects.iter().any(|needle| command.contains(needle.as_str())) {
            return Err(SessionError::Closed);
        }
        let stdout = if command == "jobs -v" {
            s.jobs_dump.clone()
        } else {
            String::new()
        };
        let stderr = s
            .rejections
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, msg)| msg.clone())
            .unwrap_or_default();
        Ok(CommandOutput { stdout, stderr })
    }

    async fn restart(&mut self) -> Result<(), SessionError> {
        let mut s = self.state.lock().unwrap();
        s.restarts += 1;
        s.hang = false;
        s.in_flight = 0;
        s.closed = false;
        Ok(())
    }

    async fn close(&mut self) {
        let mut s = self.state.lock().unwrap();
        s.closed = true;
        s.events.push("close".to_string());
    }
}
