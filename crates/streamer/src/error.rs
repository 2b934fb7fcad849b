use thiserror::Error;
use tonic::Code;

/// Failure reported by the transport while opening, using or releasing a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote side or the channel answered with a non-OK gRPC status
    #[error("rpc status {code:?}: {message}")]
    Status { code: Code, message: String },

    /// The stream was already closed locally
    #[error("stream is closed")]
    Closed,

    /// The call ended while the client still had messages to write
    #[error("request stream is no longer accepting messages")]
    SendHalfClosed,

    /// The endpoint URI could not be parsed
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The configured service name cannot be turned into a method path
    #[error("invalid service path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl TransportError {
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// gRPC status code, if the error came from the remote side
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        Self::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}
