//! Retry policy for items whose download attempt failed.
//!
//! Failures are classified (rejected start command, job vanished without the
//! local scan confirming it, lost engine connection) so every pass shares one
//! decision table.

mod classify;
mod policy;

pub use classify::classify;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
