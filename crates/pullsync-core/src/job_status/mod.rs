//! Structured view of one lftp job as listed by `jobs -v`.
//!
//! A `JobStatus` is transient: lftp has no terminal job states, a job that
//! finishes or fails simply stops being listed.

mod transfer;

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

pub use transfer::TransferState;

/// Job id lftp has not assigned yet (entries still waiting in its command queue).
pub const UNASSIGNED_JOB_ID: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Directory transfer (`mirror`).
    Mirror,
    /// Single-file parallel transfer (`pget`).
    Pget,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Mirror => "mirror",
            JobKind::Pget => "pget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
        }
    }
}

/// Transfer state assigned to a job that has not started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot set transfer state on job {job_id} ({name}): job is queued")]
pub struct InvalidOperation {
    pub job_id: i64,
    pub name: String,
}

/// One job currently known to lftp.
///
/// Equality compares the active-file map as a set of (file, state) pairs, so
/// the order in which files were added does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    job_id: i64,
    kind: JobKind,
    state: JobState,
    name: String,
    flags: String,
    total_transfer_state: Option<TransferState>,
    active_file_transfer_states: HashMap<String, TransferState>,
}

impl JobStatus {
    pub fn new(
        job_id: i64,
        kind: JobKind,
        state: JobState,
        name: impl Into<String>,
        flags: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            kind,
            state,
            name: name.into(),
            flags: flags.into(),
            total_transfer_state: None,
            active_file_transfer_states: HashMap::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn total_transfer_state(&self) -> Option<&TransferState> {
        self.total_transfer_state.as_ref()
    }

    fn ensure_started(&self) -> Result<(), InvalidOperation> {
        if self.state == JobState::Queued {
            return Err(InvalidOperation {
                job_id: self.job_id,
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Fails on a queued job: a job that hasn't started has no measurable progress.
    pub fn set_total_transfer_state(&mut self, state: TransferState) -> Result<(), InvalidOperation> {
        self.ensure_started()?;
        self.total_transfer_state = Some(state);
        Ok(())
    }

    /// Records progress of one file of the job. Fails on a queued job.
    pub fn add_active_file_transfer_state(
        &mut self,
        file_name: impl Into<String>,
        state: TransferState,
    ) -> Result<(), InvalidOperation> {
        self.ensure_started()?;
        self.active_file_transfer_states.insert(file_name.into(), state);
        Ok(())
    }

    /// Active files in unspecified order.
    pub fn active_file_transfer_states(&self) -> impl Iterator<Item = (&str, &TransferState)> {
        self.active_file_transfer_states
            .iter()
            .map(|(name, state)| (name.as_str(), state))
    }
}
