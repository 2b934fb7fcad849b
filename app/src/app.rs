use crate::config::{parse_socket_addr, ClientConfig, ConfigOverrides};
use crate::diagnostics::{DiagnosticsHandle, DiagnosticsServer};
use crate::error::Error;
use crate::metrics;
use crate::streaming::{RetryPolicy, StreamMode, Supervisor, SupervisorExit};
use clap::Parser;
use eyre::Result;
use futures::pin_mut;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use streamer::{GrpcStreamer, StreamerService};
use tracing::*;
use tracing_subscriber::{prelude::*, EnvFilter};

#[inline]
pub fn run() -> Result<()> {
    App::parse().run()
}

#[derive(Parser)]
#[command(author, version, about = "Streaming RPC client", long_about = None)]
pub struct App {
    /// TOML or JSON config file, command line flags take precedence
    #[arg(long, env = "STREAMER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// URI of the remote Streamer service
    #[arg(long, env = "STREAMER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Fully-qualified gRPC service name
    #[arg(long, env = "STREAMER_SERVICE")]
    pub service: Option<String>,

    #[arg(long, value_enum, env = "STREAMER_MODE")]
    pub mode: Option<StreamMode>,

    /// Round-trips per bidirectional attempt
    #[arg(long = "exchange-len", env = "STREAMER_EXCHANGE_LEN")]
    pub exchange_len: Option<u64>,

    /// Messages requested per server-stream attempt
    #[arg(long, env = "STREAMER_COUNT")]
    pub count: Option<u64>,

    #[arg(
        long = "diagnostics-addr",
        env = "STREAMER_DIAGNOSTICS_ADDR",
        value_parser = parse_socket_addr
    )]
    pub diagnostics_addr: Option<SocketAddr>,

    #[arg(long = "connect-timeout-ms", env = "STREAMER_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    #[arg(
        long = "full-log-context",
        env = "FULL_LOG_CONTEXT",
        default_value_t = false
    )]
    pub full_log_context: bool,
}

impl App {
    pub fn run(self) -> Result<()> {
        self.init_tracing();
        metrics::mark_process_start();
        let config = self.load_config()?;
        let tokio_runtime = tokio_runtime()?;
        tokio_runtime.block_on(execute(config))?;
        Ok(())
    }

    fn init_tracing(&self) {
        let rust_log_level = Level::from_str(
            std::env::var("RUST_LOG")
                .unwrap_or("info".to_string())
                .as_str(),
        )
        .unwrap_or(Level::INFO);

        let filter = if self.full_log_context {
            EnvFilter::builder().parse_lossy(rust_log_level.as_str())
        } else {
            let filter_tag = format!("streamer_client={rust_log_level},streamer={rust_log_level}");
            EnvFilter::builder().parse_lossy(filter_tag.as_str())
        };

        let main_layer = tracing_subscriber::fmt::layer().with_target(true);

        let layers = if rust_log_level == Level::DEBUG || rust_log_level == Level::TRACE {
            vec![main_layer
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter)
                .boxed()]
        } else {
            vec![main_layer.with_filter(filter).boxed()]
        };

        tracing_subscriber::registry().with(layers).init();
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            service: self.service.clone(),
            mode: self.mode,
            exchange_len: self.exchange_len,
            server_stream_count: self.count,
            connect_timeout_ms: self.connect_timeout_ms,
            diagnostics_addr: self.diagnostics_addr,
        }
    }

    fn load_config(&self) -> Result<ClientConfig, Error> {
        let config = match &self.config {
            Some(path) => {
                info!("Loading config from {}", path.display());
                ClientConfig::load_from_file(path)?
            }
            None => ClientConfig::default(),
        }
        .with_overrides(self.overrides());
        config.validate()?;
        Ok(config)
    }
}

/// Run the client until a shutdown signal, a bounded retry policy, or the
/// loss of the diagnostics endpoint ends it.
pub async fn execute(config: ClientConfig) -> Result<(), Error> {
    let mut diagnostics = DiagnosticsServer::new(config.diagnostics_addr).start()?;

    let client = Arc::new(GrpcStreamer::connect_lazy(
        &config.endpoint,
        &config.service,
        config.connect_timeout(),
    )?);

    let mut supervisor = Supervisor::with_policy(
        client,
        config.driver_config(),
        config.retry.clone().into_policy(),
    );

    info!(
        endpoint = %config.endpoint,
        service = %config.service,
        mode = %config.mode,
        retry = config.retry.strategy_name(),
        "Starting streamer client"
    );

    let exit = supervise(&mut supervisor, config.mode, &mut diagnostics).await?;

    info!(attempts = exit.attempts(), "Supervisor exited: {exit:?}");
    diagnostics.stop().await?;
    Ok(())
}

/// Drive the supervisor while watching the diagnostics listener and the
/// process signals. Losing the listener cancels the supervisor and is fatal.
async fn supervise<C, P>(
    supervisor: &mut Supervisor<C, P>,
    mode: StreamMode,
    diagnostics: &mut DiagnosticsHandle,
) -> Result<SupervisorExit, Error>
where
    C: StreamerService,
    P: RetryPolicy,
{
    let cancel = supervisor.cancellation_token();
    let supervisor_run = supervisor.run(mode);
    let shutdown = shutdown_signal();
    pin_mut!(supervisor_run, shutdown);

    let exit = tokio::select! {
        reason = diagnostics.terminated() => {
            error!("Diagnostics endpoint terminated: {reason}");
            cancel.cancel();
            // the in-flight attempt still closes its stream
            let exit = supervisor_run.await;
            debug!(attempts = exit.attempts(), "Supervisor cancelled");
            return Err(Error::DiagnosticsFatal(reason));
        }
        exit = &mut supervisor_run => exit,
        signal = &mut shutdown => {
            signal?;
            cancel.cancel();
            supervisor_run.await
        }
    };

    Ok(exit)
}

pub fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

async fn shutdown_signal() -> Result<(), std::io::Error> {
    let ctrl_c = tokio::signal::ctrl_c();

    let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let sigterm = stream.recv();
    pin_mut!(sigterm, ctrl_c);

    tokio::select! {
        res = ctrl_c => {
            res?;
            info!("Received ctrl-c");
        },
        _ = sigterm => {
            info!("Received SIGTERM");
        },
    }

    Ok(())
}
