//! Wire messages of the Streamer service and its method paths.
//!
//! The messages mirror the remote `stream.proto` schema:
//!
//! ```text
//! service Streamer {
//!     rpc Stream(stream Request) returns (stream Response) {}
//!     rpc ServerStream(Request) returns (stream Response) {}
//! }
//! message Request { int64 count = 1; }
//! message Response { int64 count = 1; }
//! ```

use crate::error::TransportError;
use http::uri::PathAndQuery;

#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct Request {
    #[prost(int64, tag = "1")]
    pub count: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct Response {
    #[prost(int64, tag = "1")]
    pub count: i64,
}

impl Request {
    pub fn new(count: i64) -> Self {
        Self { count }
    }
}

impl Response {
    pub fn new(count: i64) -> Self {
        Self { count }
    }
}

/// gRPC method paths for one Streamer service name.
#[derive(Debug, Clone)]
pub struct ServicePath {
    service: String,
    stream: PathAndQuery,
    server_stream: PathAndQuery,
}

impl ServicePath {
    pub fn new(service: impl Into<String>) -> Result<Self, TransportError> {
        let service = service.into();
        if service.is_empty() {
            return Err(TransportError::InvalidPath {
                path: service,
                reason: "service name is empty".to_string(),
            });
        }
        if service.contains('/') || service.chars().any(char::is_whitespace) {
            return Err(TransportError::InvalidPath {
                path: service,
                reason: "service name must not contain '/' or whitespace".to_string(),
            });
        }

        let stream = Self::method(&service, "Stream")?;
        let server_stream = Self::method(&service, "ServerStream")?;

        Ok(Self {
            service,
            stream,
            server_stream,
        })
    }

    fn method(service: &str, method: &str) -> Result<PathAndQuery, TransportError> {
        let path = format!("/{service}/{method}");
        path.parse::<PathAndQuery>()
            .map_err(|e| TransportError::InvalidPath {
                path,
                reason: e.to_string(),
            })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Path of the bidirectional `Stream` method
    pub fn stream(&self) -> &PathAndQuery {
        &self.stream
    }

    /// Path of the server-streaming `ServerStream` method
    pub fn server_stream(&self) -> &PathAndQuery {
        &self.server_stream
    }
}
