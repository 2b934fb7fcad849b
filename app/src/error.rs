use crate::config::ConfigError;
use crate::diagnostics::DiagnosticsError;
use streamer::TransportError;
use thiserror::Error;

/// Errors that end the process.
///
/// Attempt failures never show up here, the supervisor absorbs them.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The diagnostics endpoint failed to bind or its listener exited
    #[error("Diagnostics endpoint is gone: {0}")]
    DiagnosticsFatal(#[from] DiagnosticsError),

    #[error("Failed to set up the Streamer client: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}
