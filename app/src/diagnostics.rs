//! Diagnostics HTTP endpoint
//!
//! Process introspection served under the fixed `/debug/` prefix. The server
//! is an owned background service: [`DiagnosticsServer::start`] binds and
//! spawns it, and the returned [`DiagnosticsHandle`] is how the rest of the
//! process stops it or learns that it went away. Losing the listener is
//! treated as fatal by the caller.

use crate::metrics;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::*;

pub const DEFAULT_DIAGNOSTICS_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6060);
pub const PATH_PREFIX: &str = "/debug/";

const INDEX: &str = "/debug/\n\
    \n\
    metrics  prometheus text exposition\n\
    health   process health as JSON\n\
    tasks    async runtime snapshot as JSON\n\
    threads  OS threads of the process as JSON\n\
    cmdline  command line, NUL separated\n";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("Failed to bind diagnostics endpoint on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Diagnostics endpoint failed: {0}")]
    Serve(String),

    #[error("Diagnostics endpoint stopped")]
    Stopped,

    #[error("Diagnostics endpoint task panicked")]
    Panicked,
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(result: Result<Value, String>) -> Response<Body> {
    match result {
        Ok(value) => respond(StatusCode::OK, "application/json", value.to_string()),
        Err(reason) => {
            warn!("Diagnostics snapshot failed: {reason}");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", reason)
        }
    }
}

fn cmdline() -> String {
    std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\0")
}

/// Scheduler view of the runtime serving the request
fn task_snapshot() -> Result<Value, String> {
    let handle = tokio::runtime::Handle::try_current().map_err(|e| e.to_string())?;
    let runtime = handle.metrics();
    Ok(json!({
        "flavor": format!("{:?}", handle.runtime_flavor()),
        "workers": runtime.num_workers(),
        "alive_tasks": runtime.num_alive_tasks(),
        "global_queue_depth": runtime.global_queue_depth(),
    }))
}

/// Thread ids, names and scheduler states read from `/proc/self/task`
fn thread_snapshot() -> Result<Value, String> {
    let tasks = std::fs::read_dir("/proc/self/task")
        .map_err(|e| format!("thread listing unavailable: {e}"))?;

    let mut threads = Vec::new();
    for entry in tasks.flatten() {
        let Some(tid) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) else {
            continue;
        };
        let path = entry.path();
        let name = std::fs::read_to_string(path.join("comm"))
            .map(|name| name.trim_end().to_string())
            .unwrap_or_default();
        let state = std::fs::read_to_string(path.join("status"))
            .ok()
            .and_then(|status| {
                status
                    .lines()
                    .find_map(|line| line.strip_prefix("State:"))
                    .map(|state| state.trim().to_string())
            })
            .unwrap_or_default();
        threads.push((tid, name, state));
    }
    threads.sort_by_key(|(tid, _, _)| *tid);

    Ok(json!({
        "count": threads.len(),
        "threads": threads
            .into_iter()
            .map(|(tid, name, state)| json!({ "tid": tid, "name": name, "state": state }))
            .collect::<Vec<_>>(),
    }))
}

async fn handle_request(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"));
    }

    let response = match req.uri().path().strip_prefix(PATH_PREFIX) {
        Some("") => respond(StatusCode::OK, "text/plain; charset=utf-8", INDEX),
        Some("metrics") => match metrics::gather_text() {
            Ok(buffer) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, buffer),
            Err(err) => {
                warn!("Failed to encode metrics: {err}");
                respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    err.to_string(),
                )
            }
        },
        Some("health") => {
            let health_status = json!({
                "status": "healthy",
                "timestamp": std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
                "version": env!("CARGO_PKG_VERSION"),
                "metrics_count": metrics::STREAMER_REGISTRY.gather().len()
            });
            respond(StatusCode::OK, "application/json", health_status.to_string())
        }
        Some("tasks") => json_response(task_snapshot()),
        Some("threads") => json_response(thread_snapshot()),
        Some("cmdline") => respond(StatusCode::OK, "text/plain; charset=utf-8", cmdline()),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };

    Ok(response)
}

pub struct DiagnosticsServer {
    addr: SocketAddr,
}

impl DiagnosticsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Bind the listener and spawn the server onto the current runtime
    pub fn start(self) -> Result<DiagnosticsHandle, DiagnosticsError> {
        let make_svc =
            make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle_request)) });

        let server = Server::try_bind(&self.addr)
            .map_err(|err| DiagnosticsError::Bind {
                addr: self.addr,
                reason: err.to_string(),
            })?
            .serve(make_svc);
        let local_addr = server.local_addr();

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let server = server.with_graceful_shutdown(async move {
            signal.cancelled().await;
        });

        info!("Starting diagnostics endpoint on http://{local_addr}{PATH_PREFIX}");
        let task = tokio::spawn(server);

        Ok(DiagnosticsHandle {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }
}

pub struct DiagnosticsHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<(), hyper::Error>>>,
}

fn exit_reason(
    result: Result<Result<(), hyper::Error>, tokio::task::JoinError>,
) -> Result<(), DiagnosticsError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(DiagnosticsError::Serve(err.to_string())),
        Err(err) if err.is_panic() => Err(DiagnosticsError::Panicked),
        Err(_) => Err(DiagnosticsError::Stopped),
    }
}

impl DiagnosticsHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that begins a graceful shutdown of the listener when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolves once the listener has exited, for whatever reason.
    ///
    /// Cancel safe: dropping the future leaves the server running.
    pub async fn terminated(&mut self) -> DiagnosticsError {
        let Some(task) = self.task.as_mut() else {
            return DiagnosticsError::Stopped;
        };
        let result = task.await;
        self.task = None;
        exit_reason(result).err().unwrap_or(DiagnosticsError::Stopped)
    }

    /// Graceful shutdown, waits for in-flight requests to finish
    pub async fn stop(mut self) -> Result<(), DiagnosticsError> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => {
                let result = exit_reason(task.await);
                debug!("Diagnostics endpoint on {} stopped", self.local_addr);
                result
            }
            None => Err(DiagnosticsError::Stopped),
        }
    }
}
