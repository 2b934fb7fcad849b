//! Supervisor: runs attempts back to back, one stream at a time
//!
//! Each attempt gets a fresh [`StreamDriver`] and starts from the same
//! initial conditions. Attempt failures are logged, counted and handed to the
//! retry policy; they never stop the supervisor.

use super::driver::StreamDriver;
use super::outcome::AttemptReport;
use super::retry::{Backoff, RetryDecision, RetryPolicy};
use super::types::{DriverConfig, StreamMode};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use streamer::StreamerService;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::*;

/// Why a supervisor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The cancellation token fired
    Cancelled { attempts: u64 },
    /// A bounded retry policy declined to start another attempt
    PolicyStopped { attempts: u64, reason: String },
}

impl SupervisorExit {
    pub fn attempts(&self) -> u64 {
        match self {
            SupervisorExit::Cancelled { attempts } | SupervisorExit::PolicyStopped { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct Supervisor<C, P = Backoff> {
    client: Arc<C>,
    driver_config: DriverConfig,
    policy: P,
    cancel: CancellationToken,
    reports: Option<mpsc::UnboundedSender<AttemptReport>>,
}

impl<C: StreamerService> Supervisor<C, Backoff> {
    /// Supervisor with the default policy: retry immediately, forever
    pub fn new(client: Arc<C>, driver_config: DriverConfig) -> Self {
        Self::with_policy(client, driver_config, Backoff::default())
    }
}

impl<C: StreamerService, P: RetryPolicy> Supervisor<C, P> {
    pub fn with_policy(client: Arc<C>, driver_config: DriverConfig, policy: P) -> Self {
        Self {
            client,
            driver_config,
            policy,
            cancel: CancellationToken::new(),
            reports: None,
        }
    }

    /// Token that stops the run; an in-flight attempt still closes its stream
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Forward every attempt report to `sink`
    pub fn with_report_sink(mut self, sink: mpsc::UnboundedSender<AttemptReport>) -> Self {
        self.reports = Some(sink);
        self
    }

    /// Run attempts in `mode` until cancelled or the policy stops.
    ///
    /// With the default policy this only returns on cancellation.
    pub async fn run(&mut self, mode: StreamMode) -> SupervisorExit {
        info!("Supervising {} streams", mode);
        let mut attempts = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                info!("Supervisor cancelled after {} attempts", attempts);
                return SupervisorExit::Cancelled { attempts };
            }

            attempts += 1;
            let report = StreamDriver::new(self.client.as_ref(), self.driver_config, self.cancel.clone())
                .with_attempt(attempts)
                .run(mode)
                .await;

            self.observe(&report);

            match self.policy.next_attempt(&report) {
                RetryDecision::Retry { delay } => {
                    if !self.pause(delay).await {
                        info!("Supervisor cancelled after {} attempts", attempts);
                        return SupervisorExit::Cancelled { attempts };
                    }
                }
                RetryDecision::Stop { reason } => {
                    info!("Supervisor stopped after {} attempts: {}", attempts, reason);
                    return SupervisorExit::PolicyStopped { attempts, reason };
                }
            }
        }
    }

    fn observe(&self, report: &AttemptReport) {
        metrics::record_attempt(report);

        match report.primary_error() {
            None => debug!(
                attempt = report.attempt,
                mode = %report.mode,
                elapsed = ?report.elapsed,
                "Attempt {}",
                report.outcome
            ),
            Some(error) => warn!(
                attempt = report.attempt,
                mode = %report.mode,
                step = error.step(),
                code = ?error.transport().and_then(|e| e.code()),
                "Attempt {}",
                report.outcome
            ),
        }
        if let Some(close_error) = &report.close_error {
            warn!(attempt = report.attempt, "Attempt also failed to close: {}", close_error);
        }

        if let Some(sink) = &self.reports {
            // a dropped receiver only means nobody is listening any more
            let _ = sink.send(report.clone());
        }
    }

    /// Wait `delay` before the next attempt; `false` when cancelled meanwhile.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            // keep the loop cooperative when attempts finish without suspending
            tokio::task::yield_now().await;
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
