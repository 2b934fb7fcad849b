//! Client configuration
//!
//! A [`ClientConfig`] starts from defaults, is optionally replaced by a TOML or
//! JSON file, then command line overrides are applied on top. Validation runs
//! last so that overrides are checked too.

use crate::diagnostics::DEFAULT_DIAGNOSTICS_ADDR;
use crate::streaming::{
    DriverConfig, RetryStrategy, StreamMode, DEFAULT_EXCHANGE_LEN, DEFAULT_SERVER_STREAM_COUNT,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    #[error("Configuration validation error: {field} - {reason}")]
    ValidationError { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// URI of the remote Streamer service
    pub endpoint: String,
    /// Fully-qualified gRPC service name
    pub service: String,
    pub mode: StreamMode,
    pub exchange_len: u64,
    pub server_stream_count: u64,
    pub connect_timeout_ms: u64,
    pub diagnostics_addr: SocketAddr,
    pub retry: RetryStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            service: streamer::DEFAULT_SERVICE_NAME.to_string(),
            mode: StreamMode::default(),
            exchange_len: DEFAULT_EXCHANGE_LEN,
            server_stream_count: DEFAULT_SERVER_STREAM_COUNT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            diagnostics_addr: DEFAULT_DIAGNOSTICS_ADDR,
            retry: RetryStrategy::default(),
        }
    }
}

/// Values given on the command line, each one replacing its config counterpart
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub service: Option<String>,
    pub mode: Option<StreamMode>,
    pub exchange_len: Option<u64>,
    pub server_stream_count: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub diagnostics_addr: Option<SocketAddr>,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl ClientConfig {
    /// Load a config file, JSON when the extension says so and TOML otherwise
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let config: ClientConfig = if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?
        };

        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(service) = overrides.service {
            self.service = service;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(exchange_len) = overrides.exchange_len {
            self.exchange_len = exchange_len;
        }
        if let Some(count) = overrides.server_stream_count {
            self.server_stream_count = count;
        }
        if let Some(timeout) = overrides.connect_timeout_ms {
            self.connect_timeout_ms = timeout;
        }
        if let Some(addr) = overrides.diagnostics_addr {
            self.diagnostics_addr = addr;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(invalid(
                "endpoint",
                format!("expected an http(s) URI, got {:?}", self.endpoint),
            ));
        }
        streamer::ServicePath::new(&self.service)
            .map_err(|e| invalid("service", e.to_string()))?;
        if self.exchange_len == 0 {
            return Err(invalid("exchange_len", "must be greater than 0"));
        }
        if self.server_stream_count == 0 {
            return Err(invalid("server_stream_count", "must be greater than 0"));
        }
        if i64::try_from(self.exchange_len.max(self.server_stream_count)).is_err() {
            return Err(invalid("exchange_len", "does not fit in a message count"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "must be greater than 0"));
        }
        self.retry
            .validate()
            .map_err(|e| invalid("retry", e.to_string()))?;
        Ok(())
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            exchange_len: self.exchange_len,
            server_stream_count: self.server_stream_count,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Parse `host:port` for the diagnostics endpoint
pub fn parse_socket_addr(s: &str) -> Result<SocketAddr, String> {
    s.parse()
        .map_err(|e| format!("invalid socket address {s:?}: {e}"))
}
