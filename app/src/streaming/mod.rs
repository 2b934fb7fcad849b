//! Streaming RPC client protocol loop
//!
//! This module drives the remote Streamer service over long-lived streams in
//! one of two interaction shapes:
//!
//! - **Bidirectional**: send `Request { count: j }`, wait for one response,
//!   repeat for a fixed number of round-trips.
//! - **Server stream**: send a single request asking for `count` messages and
//!   read the responses the server pushes back.
//!
//! # Architecture
//!
//! The [`StreamDriver`] owns one stream for the duration of one attempt and
//! always closes it before returning a typed [`AttemptReport`]. The
//! [`Supervisor`] runs attempts back to back against a shared client handle,
//! consulting a pluggable [`RetryPolicy`] in between. The default policy
//! retries immediately and forever.

pub mod driver;
pub mod error;
pub mod outcome;
pub mod retry;
pub mod supervisor;
pub mod types;

#[cfg(test)]
mod tests;

pub use driver::StreamDriver;
pub use error::AttemptError;
pub use outcome::{AttemptOutcome, AttemptReport};
pub use retry::{Backoff, RetryDecision, RetryPolicy, RetryStrategy};
pub use supervisor::{Supervisor, SupervisorExit};
pub use types::*;

/// Round-trips performed by one bidirectional attempt
pub const DEFAULT_EXCHANGE_LEN: u64 = 10;
/// `count` requested from the server by one server-stream attempt
pub const DEFAULT_SERVER_STREAM_COUNT: u64 = 10;
