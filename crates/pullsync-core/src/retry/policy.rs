use std::time::Duration;

use tokio::time::Instant;

/// Why an item's download attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The engine session is gone. Says nothing about the item.
    Connection,
    /// lftp refused the start command.
    Rejected,
    /// The job disappeared and nothing showed up locally within the grace window.
    Vanished,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave the item alone and stop the current pass.
    AbortPass,
    /// Put the item back in the queue.
    Requeue,
    /// Mark the item `DOWNLOAD_FAILED`.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures after which an item is given up on.
    pub max_retries: u32,
    /// How long a vanished job may wait for local confirmation.
    pub confirmation_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            confirmation_grace: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `failures` is the item's retry count including this failure.
    pub fn decide(&self, failures: u32, kind: ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::Connection => RetryDecision::AbortPass,
            ErrorKind::Rejected | ErrorKind::Vanished => {
                if failures >= self.max_retries {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Requeue
                }
            }
        }
    }

    pub fn grace_expired(&self, since: Instant, now: Instant) -> bool {
        now.saturating_duration_since(since) >= self.confirmation_grace
    }
}
