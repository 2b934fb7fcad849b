use crate::error::TransportError;
use crate::proto::{Request, Response};
use async_trait::async_trait;

/// Handle to the remote Streamer service.
///
/// One handle is created per process and shared by every attempt, so
/// implementations must tolerate being used to open one stream after another.
#[async_trait]
pub trait StreamerService: Send + Sync {
    type Bidi: BidiStream;
    type Server: ServerStream;

    /// Open a bidirectional stream (`Stream` method)
    async fn open_bidi_stream(&self) -> Result<Self::Bidi, TransportError>;

    /// Send `request` and open the response stream of the `ServerStream` method
    async fn open_server_stream(&self, request: Request) -> Result<Self::Server, TransportError>;
}

/// Open bidirectional stream of requests and responses.
#[async_trait]
pub trait BidiStream: Send {
    async fn send(&mut self, request: Request) -> Result<(), TransportError>;

    /// Next response; `Ok(None)` once the remote side ended the stream cleanly.
    async fn recv(&mut self) -> Result<Option<Response>, TransportError>;

    /// Release the stream. Any call after a close fails with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Receive-only stream opened by a single request.
#[async_trait]
pub trait ServerStream: Send {
    /// Next response; `Ok(None)` once the remote side ended the stream cleanly.
    async fn recv(&mut self) -> Result<Option<Response>, TransportError>;

    /// Release the stream. Any call after a close fails with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}
