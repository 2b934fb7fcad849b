//! gRPC transport for the Streamer service.
//!
//! The client is hand-wired on top of [`tonic::client::Grpc`] with a
//! [`ProstCodec`], the same way generated clients call `streaming` and
//! `server_streaming`.

use crate::client::{BidiStream, ServerStream, StreamerService};
use crate::error::TransportError;
use crate::proto::{Request, Response, ServicePath};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::*;

/// Outbound messages buffered ahead of the transport.
const REQUEST_BUFFER: usize = 16;

type ResponseFuture =
    BoxFuture<'static, Result<tonic::Response<Streaming<Response>>, tonic::Status>>;

/// Streamer client over a single lazily-connected gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcStreamer {
    grpc: Grpc<Channel>,
    path: ServicePath,
}

impl GrpcStreamer {
    /// Build the client without touching the network. Connection problems
    /// surface on the first call of every attempt instead of here.
    pub fn connect_lazy(
        endpoint: &str,
        service: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let path = ServicePath::new(service)?;
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(connect_timeout)
            .connect_lazy();

        info!(
            "Streamer client for {} configured against {}",
            path.service(),
            endpoint
        );

        Ok(Self {
            grpc: Grpc::new(channel),
            path,
        })
    }

    pub fn service_path(&self) -> &ServicePath {
        &self.path
    }

    async fn ready(&self) -> Result<Grpc<Channel>, TransportError> {
        let mut grpc = self.grpc.clone();
        grpc.ready().await.map_err(|e| {
            TransportError::status(Code::Unknown, format!("service was not ready: {e}"))
        })?;
        Ok(grpc)
    }
}

#[async_trait]
impl StreamerService for GrpcStreamer {
    type Bidi = GrpcBidiStream;
    type Server = GrpcServerStream;

    async fn open_bidi_stream(&self) -> Result<Self::Bidi, TransportError> {
        let mut grpc = self.ready().await?;
        let path = self.path.stream().clone();
        let (sender, receiver) = mpsc::channel(REQUEST_BUFFER);
        let request = tonic::Request::new(ReceiverStream::new(receiver));

        // Some servers only flush response headers together with the first
        // message, so the call is driven from `recv` rather than awaited here.
        let call: ResponseFuture = Box::pin(async move {
            let codec: ProstCodec<Request, Response> = ProstCodec::default();
            grpc.streaming(request, path, codec).await
        });

        trace!("Opened bidirectional stream on {}", self.path.stream());
        Ok(GrpcBidiStream {
            sender: Some(sender),
            responses: ResponseState::Pending(call),
        })
    }

    async fn open_server_stream(&self, request: Request) -> Result<Self::Server, TransportError> {
        let mut grpc = self.ready().await?;
        let codec: ProstCodec<Request, Response> = ProstCodec::default();
        let response = grpc
            .server_streaming(
                tonic::Request::new(request),
                self.path.server_stream().clone(),
                codec,
            )
            .await?;

        trace!("Opened server stream on {}", self.path.server_stream());
        Ok(GrpcServerStream {
            responses: Some(response.into_inner()),
        })
    }
}

enum ResponseState {
    /// Call issued, response headers not yet received
    Pending(ResponseFuture),
    Open(Streaming<Response>),
    /// The call itself failed; every receive reports the same status
    Failed(TransportError),
    Closed,
}

/// Bidirectional `Stream` call.
pub struct GrpcBidiStream {
    sender: Option<mpsc::Sender<Request>>,
    responses: ResponseState,
}

#[async_trait]
impl BidiStream for GrpcBidiStream {
    async fn send(&mut self, request: Request) -> Result<(), TransportError> {
        let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(request)
            .await
            .map_err(|_| TransportError::SendHalfClosed)
    }

    async fn recv(&mut self) -> Result<Option<Response>, TransportError> {
        loop {
            match &mut self.responses {
                ResponseState::Pending(call) => {
                    let result = call.await;
                    self.responses = match result {
                        Ok(response) => ResponseState::Open(response.into_inner()),
                        Err(status) => ResponseState::Failed(status.into()),
                    };
                }
                ResponseState::Open(streaming) => {
                    return streaming.message().await.map_err(Into::into);
                }
                ResponseState::Failed(err) => return Err(err.clone()),
                ResponseState::Closed => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if matches!(self.responses, ResponseState::Closed) {
            return Err(TransportError::Closed);
        }
        // dropping the sender half-closes the request side of the call
        self.sender.take();
        self.responses = ResponseState::Closed;
        trace!("Closed bidirectional stream");
        Ok(())
    }
}

/// Response side of a `ServerStream` call.
pub struct GrpcServerStream {
    responses: Option<Streaming<Response>>,
}

#[async_trait]
impl ServerStream for GrpcServerStream {
    async fn recv(&mut self) -> Result<Option<Response>, TransportError> {
        match self.responses.as_mut() {
            Some(streaming) => streaming.message().await.map_err(Into::into),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.responses.take() {
            Some(_) => {
                trace!("Closed server stream");
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}
