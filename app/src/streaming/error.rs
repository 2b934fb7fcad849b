//! Error taxonomy of a single streaming attempt
//!
//! Every variant names the step that failed. Errors never cross the attempt
//! boundary: the driver folds them into an [`AttemptOutcome`](super::AttemptOutcome)
//! and the supervisor moves on to the next attempt.

use streamer::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Opening the stream failed, nothing was exchanged
    #[error("failed to open stream: {source}")]
    StreamOpen { source: TransportError },

    /// Writing request `index` failed
    #[error("failed to send request {index}: {source}")]
    Send { index: u64, source: TransportError },

    /// Reading response `index` failed
    #[error("failed to receive response {index}: {source}")]
    Recv { index: u64, source: TransportError },

    /// The remote side ended a bidirectional stream before response `index`
    #[error("remote ended the stream before response {index}")]
    EndOfStream { index: u64 },

    /// Releasing the stream failed
    #[error("failed to close stream: {source}")]
    Close { source: TransportError },
}

impl AttemptError {
    /// Step of the protocol loop that failed, used as a log field and metric label
    pub fn step(&self) -> &'static str {
        match self {
            AttemptError::StreamOpen { .. } => "open",
            AttemptError::Send { .. } => "send",
            AttemptError::Recv { .. } | AttemptError::EndOfStream { .. } => "recv",
            AttemptError::Close { .. } => "close",
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            AttemptError::StreamOpen { source }
            | AttemptError::Send { source, .. }
            | AttemptError::Recv { source, .. }
            | AttemptError::Close { source } => Some(source),
            AttemptError::EndOfStream { .. } => None,
        }
    }
}
