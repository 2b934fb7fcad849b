//! Mock implementation of the Streamer service
//!
//! `MockStreamer` echoes bidirectional requests and streams `0..count` back
//! for server-stream requests. Faults are injected per attempt through a
//! [`MockScript`], and every stream keeps a [`StreamRecord`] so tests can
//! verify exactly which calls the driver made.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use streamer::{
    BidiStream, Code, Request, Response, ServerStream, StreamerService, TransportError,
};

/// Faults injected into one attempt. Indices are 0-based per stream.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub fail_open: bool,
    pub fail_send_at: Option<u64>,
    pub fail_recv_at: Option<u64>,
    /// Remote ends the stream cleanly instead of answering receive `n`
    pub end_at: Option<u64>,
    /// Receive `n` never completes
    pub stall_recv_at: Option<u64>,
    pub fail_close: bool,
}

impl MockScript {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Default::default()
        }
    }

    pub fn failing_send_at(index: u64) -> Self {
        Self {
            fail_send_at: Some(index),
            ..Default::default()
        }
    }

    pub fn failing_recv_at(index: u64) -> Self {
        Self {
            fail_recv_at: Some(index),
            ..Default::default()
        }
    }

    pub fn ending_at(index: u64) -> Self {
        Self {
            end_at: Some(index),
            ..Default::default()
        }
    }

    pub fn stalling_recv_at(index: u64) -> Self {
        Self {
            stall_recv_at: Some(index),
            ..Default::default()
        }
    }

    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

/// Calls observed on one opened stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRecord {
    /// `count` of the request that opened a server stream
    pub requested: Option<i64>,
    pub send_calls: u64,
    pub recv_calls: u64,
    pub close_calls: u64,
    /// Requests accepted by the stream
    pub sent: Vec<i64>,
    /// Responses handed to the client
    pub received: Vec<i64>,
}

#[derive(Debug, Default)]
struct MockHistory {
    open_calls: u64,
    streams: Vec<StreamRecord>,
}

type SharedHistory = Arc<Mutex<MockHistory>>;

/// Scripted in-memory Streamer service
#[derive(Debug, Clone)]
pub struct MockStreamer {
    scripts: Vec<MockScript>,
    history: SharedHistory,
}

impl MockStreamer {
    /// Healthy remote for every attempt
    pub fn echo() -> Self {
        Self::with_scripts(vec![MockScript::echo()])
    }

    /// Attempt `i` uses `scripts[i]`; attempts past the end reuse the last script
    pub fn with_scripts(scripts: Vec<MockScript>) -> Self {
        assert!(!scripts.is_empty(), "at least one script is required");
        Self {
            scripts,
            history: Arc::default(),
        }
    }

    pub fn open_calls(&self) -> u64 {
        self.history.lock().unwrap().open_calls
    }

    /// Records of every stream opened so far, in order
    pub fn streams(&self) -> Vec<StreamRecord> {
        self.history.lock().unwrap().streams.clone()
    }

    fn next_script(&self) -> MockScript {
        let mut history = self.history.lock().unwrap();
        let index = history.open_calls as usize;
        history.open_calls += 1;
        self.scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default()
    }

    fn register(&self, requested: Option<i64>) -> usize {
        let mut history = self.history.lock().unwrap();
        history.streams.push(StreamRecord {
            requested,
            ..Default::default()
        });
        history.streams.len() - 1
    }
}

fn injected(step: &str) -> TransportError {
    TransportError::status(Code::Unavailable, format!("injected {step} failure"))
}

#[async_trait]
impl StreamerService for MockStreamer {
    type Bidi = MockBidiStream;
    type Server = MockServerStream;

    async fn open_bidi_stream(&self) -> Result<Self::Bidi, TransportError> {
        let script = self.next_script();
        if script.fail_open {
            return Err(injected("open"));
        }
        let id = self.register(None);
        Ok(MockBidiStream {
            state: MockStreamState::new(id, script, self.history.clone()),
            pending: VecDeque::new(),
            sends: 0,
        })
    }

    async fn open_server_stream(&self, request: Request) -> Result<Self::Server, TransportError> {
        let script = self.next_script();
        if script.fail_open {
            return Err(injected("open"));
        }
        let id = self.register(Some(request.count));
        Ok(MockServerStream {
            state: MockStreamState::new(id, script, self.history.clone()),
            limit: request.count.max(0) as u64,
        })
    }
}

struct MockStreamState {
    id: usize,
    script: MockScript,
    history: SharedHistory,
    recvs: u64,
    closed: bool,
}

impl MockStreamState {
    fn new(id: usize, script: MockScript, history: SharedHistory) -> Self {
        Self {
            id,
            script,
            history,
            recvs: 0,
            closed: false,
        }
    }

    fn record<F: FnOnce(&mut StreamRecord)>(&self, f: F) {
        let mut history = self.history.lock().unwrap();
        f(&mut history.streams[self.id]);
    }

    /// Shared receive preamble; `Some` short-circuits the receive
    async fn before_recv(&mut self) -> (u64, Option<Result<Option<Response>, TransportError>>) {
        self.record(|r| r.recv_calls += 1);
        if self.closed {
            return (self.recvs, Some(Err(TransportError::Closed)));
        }

        let index = self.recvs;
        self.recvs += 1;

        if self.script.stall_recv_at == Some(index) {
            futures::future::pending::<()>().await;
        }
        if self.script.fail_recv_at == Some(index) {
            return (index, Some(Err(injected("recv"))));
        }
        if self.script.end_at == Some(index) {
            return (index, Some(Ok(None)));
        }
        (index, None)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.record(|r| r.close_calls += 1);
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        if self.script.fail_close {
            return Err(injected("close"));
        }
        Ok(())
    }
}

pub struct MockBidiStream {
    state: MockStreamState,
    pending: VecDeque<i64>,
    sends: u64,
}

#[async_trait]
impl BidiStream for MockBidiStream {
    async fn send(&mut self, request: Request) -> Result<(), TransportError> {
        self.state.record(|r| r.send_calls += 1);
        if self.state.closed {
            return Err(TransportError::Closed);
        }

        let index = self.sends;
        self.sends += 1;
        if self.state.script.fail_send_at == Some(index) {
            return Err(injected("send"));
        }

        self.state.record(|r| r.sent.push(request.count));
        self.pending.push_back(request.count);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Response>, TransportError> {
        if let (_, Some(result)) = self.state.before_recv().await {
            return result;
        }
        match self.pending.pop_front() {
            Some(count) => {
                self.state.record(|r| r.received.push(count));
                Ok(Some(Response::new(count)))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.close()
    }
}

pub struct MockServerStream {
    state: MockStreamState,
    limit: u64,
}

#[async_trait]
impl ServerStream for MockServerStream {
    async fn recv(&mut self) -> Result<Option<Response>, TransportError> {
        let index = match self.state.before_recv().await {
            (_, Some(result)) => return result,
            (index, None) => index,
        };
        if index >= self.limit {
            return Ok(None);
        }
        let count = index as i64;
        self.state.record(|r| r.received.push(count));
        Ok(Some(Response::new(count)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.close()
    }
}
