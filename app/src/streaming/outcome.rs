//! Typed result of one attempt

use super::error::AttemptError;
use super::types::{Exchange, StreamMode};
use std::fmt;
use std::time::Duration;

/// Terminal outcome of one attempt.
///
/// `exchanged` counts completed round-trips (bidirectional) or received
/// responses (server stream) before the attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed { exchanged: u64 },
    /// Opening the stream or writing a request failed
    SendFailed { exchanged: u64, error: AttemptError },
    RecvFailed { exchanged: u64, error: AttemptError },
    /// Only the final close failed
    CloseFailed { exchanged: u64, error: AttemptError },
    Cancelled { exchanged: u64 },
}

impl AttemptOutcome {
    pub fn exchanged(&self) -> u64 {
        match self {
            AttemptOutcome::Completed { exchanged }
            | AttemptOutcome::SendFailed { exchanged, .. }
            | AttemptOutcome::RecvFailed { exchanged, .. }
            | AttemptOutcome::CloseFailed { exchanged, .. }
            | AttemptOutcome::Cancelled { exchanged } => *exchanged,
        }
    }

    pub fn error(&self) -> Option<&AttemptError> {
        match self {
            AttemptOutcome::SendFailed { error, .. }
            | AttemptOutcome::RecvFailed { error, .. }
            | AttemptOutcome::CloseFailed { error, .. } => Some(error),
            AttemptOutcome::Completed { .. } | AttemptOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AttemptOutcome::Completed { .. })
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptOutcome::Completed { .. } => "completed",
            AttemptOutcome::SendFailed { .. } => "send_failed",
            AttemptOutcome::RecvFailed { .. } => "recv_failed",
            AttemptOutcome::CloseFailed { .. } => "close_failed",
            AttemptOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Completed { exchanged } => write!(f, "completed({exchanged})"),
            AttemptOutcome::Cancelled { exchanged } => write!(f, "cancelled after {exchanged}"),
            other => match other.error() {
                Some(error) => write!(
                    f,
                    "{} after {}: {}",
                    other.kind(),
                    other.exchanged(),
                    error
                ),
                None => f.write_str(other.kind()),
            },
        }
    }
}

/// Everything observed during one attempt
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// 1-based attempt number within the supervisor run, 0 outside a supervisor
    pub attempt: u64,
    pub mode: StreamMode,
    pub outcome: AttemptOutcome,
    /// Close failure that was not promoted because an earlier failure won
    pub close_error: Option<AttemptError>,
    /// Requests the transport accepted, including the one that opens a
    /// server stream and any sent before a failed receive
    pub requests_sent: u64,
    pub exchanges: Vec<Exchange>,
    pub elapsed: Duration,
}

impl AttemptReport {
    /// Error that will be reported for the attempt, if any
    pub fn primary_error(&self) -> Option<&AttemptError> {
        self.outcome.error()
    }
}
