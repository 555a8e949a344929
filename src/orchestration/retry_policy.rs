//! # Retry Policy
//!
//! Bounded retries with exponential backoff and jitter for transient failures only.
//! Each pipeline gets its own policy invocation; no retry budget is shared.

use crate::capability::CapabilityError;
use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for CapabilityError {
    fn is_transient(&self) -> bool {
        CapabilityError::is_transient(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.max_delay())
    }

    /// Deterministic delays, for tests and benchmarks
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempt `attempt` and `attempt + 1` (1-based):
    /// `base * 2^(attempt-1)` plus jitter in `[0, base)`, capped at the max delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter = if self.jitter {
            self.base_delay.mul_f64(fastrand::f64())
        } else {
            Duration::ZERO
        };
        backoff.saturating_add(jitter).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out.
    ///
    /// `operation` receives the 1-based attempt number. Exhaustion yields the last error.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
