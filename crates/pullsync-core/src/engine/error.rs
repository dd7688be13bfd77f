//! Engine and session error types.

use std::io;

/// Failure of the transport to the lftp process itself.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("lftp session io: {0}")]
    Io(#[from] io::Error),
    #[error("lftp session closed")]
    Closed,
}

/// Error returned by [`super::TransferEngine`] operations.
///
/// `Connection` is fatal to the current cycle only: the engine restarts the
/// session on the next call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("lftp rejected {operation}: {message}")]
    Command {
        operation: &'static str,
        message: String,
    },
    #[error("lftp session unavailable: {0}")]
    Connection(String),
}

impl EngineError {
    pub fn is_connection(&self) -> bool {
        matches!(self, EngineError::Connection(_))
    }
}
