//! StreamDriver: one attempt over exactly one stream
//!
//! The driver opens a stream, runs the exchange loop for the selected mode
//! and closes the stream on every exit path before returning a typed
//! [`AttemptReport`]. Nothing inside an attempt is ever propagated as an
//! error to the caller.

use super::error::AttemptError;
use super::outcome::{AttemptOutcome, AttemptReport};
use super::types::{DriverConfig, Exchange, StreamMode};
use std::future::Future;
use std::time::Instant;
use streamer::{BidiStream, Request, ServerStream, StreamerService, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::*;

/// Drives a single attempt against a shared client handle
pub struct StreamDriver<'a, C> {
    client: &'a C,
    config: DriverConfig,
    cancel: CancellationToken,
    attempt: u64,
}

impl<'a, C: StreamerService> StreamDriver<'a, C> {
    pub fn new(client: &'a C, config: DriverConfig, cancel: CancellationToken) -> Self {
        Self {
            client,
            config,
            cancel,
            attempt: 0,
        }
    }

    /// Attempt number reported back in the [`AttemptReport`]
    pub fn with_attempt(mut self, attempt: u64) -> Self {
        self.attempt = attempt;
        self
    }

    /// Run one attempt in the given mode
    pub async fn run(&self, mode: StreamMode) -> AttemptReport {
        match mode {
            StreamMode::Bidirectional => self.run_bidirectional().await,
            StreamMode::ServerStream => self.run_server_stream(self.config.server_stream_count).await,
        }
    }

    /// Alternate send and receive for `exchange_len` round-trips.
    pub async fn run_bidirectional(&self) -> AttemptReport {
        let mode = StreamMode::Bidirectional;
        let started = Instant::now();
        let mut exchanges = Vec::new();

        let mut stream = match self.guarded(self.client.open_bidi_stream()).await {
            Some(Ok(stream)) => stream,
            Some(Err(source)) => {
                debug!(attempt = self.attempt, step = "open", "err: {}", source);
                let outcome = AttemptOutcome::SendFailed {
                    exchanged: 0,
                    error: AttemptError::StreamOpen { source },
                };
                return self.report(mode, outcome, None, 0, exchanges, started);
            }
            None => {
                let outcome = AttemptOutcome::Cancelled { exchanged: 0 };
                return self.report(mode, outcome, None, 0, exchanges, started);
            }
        };

        let mut failure = None;
        let mut requests_sent = 0;
        for j in 0..self.config.exchange_len {
            let count = j as i64;
            match self.guarded(stream.send(Request::new(count))).await {
                Some(Ok(())) => requests_sent += 1,
                Some(Err(source)) => {
                    debug!(attempt = self.attempt, step = "send", "err: {}", source);
                    failure = Some(AttemptOutcome::SendFailed {
                        exchanged: j,
                        error: AttemptError::Send { index: j, source },
                    });
                    break;
                }
                None => {
                    failure = Some(AttemptOutcome::Cancelled { exchanged: j });
                    break;
                }
            }

            match self.guarded(stream.recv()).await {
                Some(Ok(Some(response))) => {
                    info!("Sent msg {} got msg {}", count, response.count);
                    exchanges.push(Exchange::round_trip(count, response.count));
                }
                Some(Ok(None)) => {
                    debug!(attempt = self.attempt, step = "recv", "recv err: remote ended the stream");
                    failure = Some(AttemptOutcome::RecvFailed {
                        exchanged: j,
                        error: AttemptError::EndOfStream { index: j },
                    });
                    break;
                }
                Some(Err(source)) => {
                    debug!(attempt = self.attempt, step = "recv", "recv err: {}", source);
                    failure = Some(AttemptOutcome::RecvFailed {
                        exchanged: j,
                        error: AttemptError::Recv { index: j, source },
                    });
                    break;
                }
                None => {
                    failure = Some(AttemptOutcome::Cancelled { exchanged: j });
                    break;
                }
            }
        }

        let closed = stream.close().await;
        self.finish(mode, failure, closed, requests_sent, exchanges, started)
    }

    /// Request `count` responses and read until the server ends the stream or
    /// `count` responses arrived, whichever comes first.
    pub async fn run_server_stream(&self, count: u64) -> AttemptReport {
        let mode = StreamMode::ServerStream;
        let started = Instant::now();
        let mut exchanges = Vec::new();

        let request = Request::new(count as i64);
        let mut stream = match self.guarded(self.client.open_server_stream(request)).await {
            Some(Ok(stream)) => stream,
            Some(Err(source)) => {
                debug!(attempt = self.attempt, step = "open", "err: {}", source);
                let outcome = AttemptOutcome::SendFailed {
                    exchanged: 0,
                    error: AttemptError::StreamOpen { source },
                };
                return self.report(mode, outcome, None, 0, exchanges, started);
            }
            None => {
                let outcome = AttemptOutcome::Cancelled { exchanged: 0 };
                return self.report(mode, outcome, None, 0, exchanges, started);
            }
        };

        // the request carrying `count` went out with the open
        let requests_sent = 1;
        let mut failure = None;
        for j in 0..count {
            match self.guarded(stream.recv()).await {
                Some(Ok(Some(response))) => {
                    info!("got msg {}", response.count);
                    exchanges.push(Exchange::pushed(response.count));
                }
                Some(Ok(None)) => {
                    debug!(attempt = self.attempt, "server ended the stream after {} responses", j);
                    break;
                }
                Some(Err(source)) => {
                    debug!(attempt = self.attempt, step = "recv", "recv err: {}", source);
                    failure = Some(AttemptOutcome::RecvFailed {
                        exchanged: j,
                        error: AttemptError::Recv { index: j, source },
                    });
                    break;
                }
                None => {
                    failure = Some(AttemptOutcome::Cancelled { exchanged: j });
                    break;
                }
            }
        }

        let closed = stream.close().await;
        self.finish(mode, failure, closed, requests_sent, exchanges, started)
    }

    /// Race `fut` against cancellation; `None` means the attempt was cancelled.
    async fn guarded<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = fut => Some(output),
        }
    }

    fn finish(
        &self,
        mode: StreamMode,
        failure: Option<AttemptOutcome>,
        closed: Result<(), TransportError>,
        requests_sent: u64,
        exchanges: Vec<Exchange>,
        started: Instant,
    ) -> AttemptReport {
        let exchanged = exchanges.len() as u64;
        let close_error = closed.err().map(|source| {
            debug!(attempt = self.attempt, step = "close", "stream close err: {}", source);
            AttemptError::Close { source }
        });

        // a close failure never outranks an earlier send/recv failure
        match (failure, close_error) {
            (Some(outcome), close_error) => {
                self.report(mode, outcome, close_error, requests_sent, exchanges, started)
            }
            (None, Some(error)) => {
                let outcome = AttemptOutcome::CloseFailed { exchanged, error };
                self.report(mode, outcome, None, requests_sent, exchanges, started)
            }
            (None, None) => {
                let outcome = AttemptOutcome::Completed { exchanged };
                self.report(mode, outcome, None, requests_sent, exchanges, started)
            }
        }
    }

    fn report(
        &self,
        mode: StreamMode,
        outcome: AttemptOutcome,
        close_error: Option<AttemptError>,
        requests_sent: u64,
        exchanges: Vec<Exchange>,
        started: Instant,
    ) -> AttemptReport {
        AttemptReport {
            attempt: self.attempt,
            mode,
            outcome,
            close_error,
            requests_sent,
            exchanges,
            elapsed: started.elapsed(),
        }
    }
}
