//! Retry policies applied by the supervisor between attempts
//!
//! The default strategy starts the next attempt immediately and never gives
//! up. Fixed-delay and exponential backoff strategies can be selected from
//! the configuration without touching the driver.

use super::outcome::AttemptReport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::*;

/// Decision taken after an attempt finished
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Start the next attempt after `delay`
    Retry { delay: Duration },
    /// Stop supervising
    Stop { reason: String },
}

impl RetryDecision {
    pub fn immediately() -> Self {
        RetryDecision::Retry {
            delay: Duration::ZERO,
        }
    }
}

/// Policy consulted by the supervisor after every attempt
pub trait RetryPolicy: Send {
    fn next_attempt(&mut self, report: &AttemptReport) -> RetryDecision;
}

/// Configurable retry strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Start the next attempt right away
    Immediate {
        #[serde(default)]
        max_attempts: Option<u64>,
    },

    /// Wait the same delay between attempts
    FixedDelay {
        delay_ms: u64,
        #[serde(default)]
        max_attempts: Option<u64>,
    },

    /// Grow the delay after consecutive failed attempts, reset after a completed one
    ExponentialBackoff {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
        /// Fraction of the delay randomized in both directions (0.0 to 1.0)
        #[serde(default)]
        jitter_factor: f64,
        #[serde(default)]
        max_attempts: Option<u64>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum RetryStrategyError {
    #[error("Invalid retry strategy: {reason}")]
    InvalidConfiguration { reason: String },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Immediate { max_attempts: None }
    }
}

impl RetryStrategy {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            RetryStrategy::Immediate { .. } => "immediate",
            RetryStrategy::FixedDelay { .. } => "fixed_delay",
            RetryStrategy::ExponentialBackoff { .. } => "exponential_backoff",
        }
    }

    pub fn max_attempts(&self) -> Option<u64> {
        match self {
            RetryStrategy::Immediate { max_attempts }
            | RetryStrategy::FixedDelay { max_attempts, .. }
            | RetryStrategy::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }

    pub fn validate(&self) -> Result<(), RetryStrategyError> {
        if self.max_attempts() == Some(0) {
            return Err(RetryStrategyError::InvalidConfiguration {
                reason: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let RetryStrategy::ExponentialBackoff {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            jitter_factor,
            ..
        } = self
        {
            if *multiplier <= 1.0 {
                return Err(RetryStrategyError::InvalidConfiguration {
                    reason: format!("multiplier must be > 1.0, got {}", multiplier),
                });
            }
            if initial_delay_ms > max_delay_ms {
                return Err(RetryStrategyError::InvalidConfiguration {
                    reason: "initial_delay_ms must not exceed max_delay_ms".to_string(),
                });
            }
            if !(0.0..=1.0).contains(jitter_factor) {
                return Err(RetryStrategyError::InvalidConfiguration {
                    reason: format!("jitter_factor must be within 0.0..=1.0, got {}", jitter_factor),
                });
            }
        }

        Ok(())
    }

    /// Delay before the next attempt given the number of consecutive failures
    pub fn calculate_delay(&self, consecutive_failures: u32) -> Duration {
        match self {
            RetryStrategy::Immediate { .. } => Duration::ZERO,
            RetryStrategy::FixedDelay { delay_ms, .. } => Duration::from_millis(*delay_ms),
            RetryStrategy::ExponentialBackoff {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
                jitter_factor,
                ..
            } => {
                if consecutive_failures == 0 {
                    return Duration::ZERO;
                }
                let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay_ms = (*initial_delay_ms as f64 * multiplier.powi(exponent))
                    .min(*max_delay_ms as f64);
                let delay = Duration::from_millis(delay_ms as u64);

                if *jitter_factor > 0.0 {
                    apply_jitter(delay, *jitter_factor)
                } else {
                    delay
                }
            }
        }
    }

    pub fn into_policy(self) -> Backoff {
        Backoff::new(self)
    }
}

fn apply_jitter(base_delay: Duration, jitter_factor: f64) -> Duration {
    use rand::Rng;

    let jitter_amount = (base_delay.as_millis() as f64 * jitter_factor) as i64;
    if jitter_amount == 0 {
        return base_delay;
    }
    let jitter = rand::thread_rng().gen_range(-jitter_amount..=jitter_amount);

    if jitter < 0 {
        base_delay.saturating_sub(Duration::from_millis(jitter.unsigned_abs()))
    } else {
        base_delay.saturating_add(Duration::from_millis(jitter as u64))
    }
}

/// Stateful [`RetryPolicy`] driven by a [`RetryStrategy`]
#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: RetryStrategy,
    attempts: u64,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            attempts: 0,
            consecutive_failures: 0,
        }
    }

    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryStrategy::default())
    }
}

impl RetryPolicy for Backoff {
    fn next_attempt(&mut self, report: &AttemptReport) -> RetryDecision {
        self.attempts += 1;
        if report.outcome.is_completed() {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }

        if let Some(max_attempts) = self.strategy.max_attempts() {
            if self.attempts >= max_attempts {
                return RetryDecision::Stop {
                    reason: format!("maximum attempts ({}) reached", max_attempts),
                };
            }
        }

        let delay = self.strategy.calculate_delay(self.consecutive_failures);
        if !delay.is_zero() {
            debug!(
                "Next attempt in {:?} ({} consecutive failures, {} strategy)",
                delay,
                self.consecutive_failures,
                self.strategy.strategy_name()
            );
        }
        RetryDecision::Retry { delay }
    }
}
