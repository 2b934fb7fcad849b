//! Client-side access to the remote Streamer service.
//!
//! The crate exposes the capability set the streaming protocol loop relies on
//! (open a bidirectional stream, open a server stream, send, receive, close)
//! as a pair of traits, plus a gRPC implementation backed by `tonic`.

mod client;
mod error;
pub mod grpc;
pub mod proto;

pub use client::{BidiStream, ServerStream, StreamerService};
pub use error::TransportError;
pub use grpc::GrpcStreamer;
pub use proto::{Request, Response, ServicePath};
pub use tonic::Code;

/// Fully-qualified name of the Streamer service as registered by the remote side.
pub const DEFAULT_SERVICE_NAME: &str = "go.micro.srv.stream.Streamer";
