//! Shared types for the streaming protocol loop

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interaction shape used by every attempt of a supervisor run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Alternate one send with one receive over a bidirectional stream
    Bidirectional,
    /// Send one request and read the responses the server pushes back
    #[default]
    ServerStream,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Bidirectional => "bidirectional",
            StreamMode::ServerStream => "server-stream",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attempt exchange limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Round-trips performed by one bidirectional attempt
    pub exchange_len: u64,
    /// `count` requested from the server, also the receive upper bound
    pub server_stream_count: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            exchange_len: super::DEFAULT_EXCHANGE_LEN,
            server_stream_count: super::DEFAULT_SERVER_STREAM_COUNT,
        }
    }
}

/// One observed message exchange.
///
/// `sent` is the request count of a bidirectional round-trip and is `None`
/// for responses read from a server stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub sent: Option<i64>,
    pub received: i64,
}

impl Exchange {
    pub fn round_trip(sent: i64, received: i64) -> Self {
        Self {
            sent: Some(sent),
            received,
        }
    }

    pub fn pushed(received: i64) -> Self {
        Self {
            sent: None,
            received,
        }
    }
}
