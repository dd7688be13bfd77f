//! Map engine errors onto retry error kinds.

use crate::engine::EngineError;
use crate::retry::policy::ErrorKind;

/// Classify an error returned while starting a transfer.
pub fn classify(e: &EngineError) -> ErrorKind {
    if e.is_connection() {
        ErrorKind::Connection
    } else {
        ErrorKind::Rejected
    }
}
