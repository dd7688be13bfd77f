//! Progress snapshot of one transfer as reported by lftp.

use serde::Serialize;

/// Immutable progress of a single transfer (a whole job or one file in it).
///
/// `bytes_done <= bytes_total` is expected but not enforced: lftp is the
/// source of truth and may report transiently inconsistent numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TransferState {
    pub bytes_done: u64,
    pub bytes_total: u64,
    /// 0-100.
    pub percent_complete: u8,
    pub speed_bytes_per_sec: u64,
    pub eta_seconds: u64,
}

impl TransferState {
    pub fn new(
        bytes_done: u64,
        bytes_total: u64,
        percent_complete: u8,
        speed_bytes_per_sec: u64,
        eta_seconds: u64,
    ) -> Self {
        Self {
            bytes_done,
            bytes_total,
            percent_complete: percent_complete.min(100),
            speed_bytes_per_sec,
            eta_seconds,
        }
    }

    /// Fraction complete in [0.0, 1.0], from the byte counts when known.
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return f64::from(self.percent_complete) / 100.0;
        }
        (self.bytes_done as f64 / self.bytes_total as f64).min(1.0)
    }
}
