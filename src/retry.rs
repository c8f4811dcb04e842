//! Retry parameters and the two backoff shapes built on them.
//!
//! [`RetryExecutor`] re-runs a fallible operation with a capped exponential
//! interval. [`PollBackoff`] drives the readiness polling loops, where the
//! sleep grows by the truncated multiplier and is never capped.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::ConfigError;

/// Configures retry and backoff behavior for a bootstrap sequence.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// First interval of the creation retry executor, in milliseconds.
    pub initial_interval_ms: u64,
    /// Upper bound of the creation retry interval, in milliseconds.
    pub max_interval_ms: u64,
    /// Growth factor. Polling loops only use its integer part.
    pub multiplier: f64,
    /// Attempt budget: total attempts for the executor, retries for polling.
    pub max_attempts: u32,
    /// First sleep of the polling loops, in milliseconds.
    pub sleep_time_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            multiplier: 2.0,
            max_attempts: 3,
            sleep_time_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multiplier.is_nan() || self.multiplier <= 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "multiplier must be greater than 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "initial_interval_ms ({}) exceeds max_interval_ms ({})",
                self.initial_interval_ms, self.max_interval_ms
            )));
        }
        Ok(())
    }

    /// Interval the executor sleeps before retry number `retry` (1-based).
    pub fn backoff_interval(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_interval_ms as f64 * self.multiplier.powi(exp);
        let capped = raw.min(self.max_interval_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
/// Returns `true` if the sleep was interrupted.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => true,
            _ = sleep(delay) => false,
        },
        None => {
            sleep(delay).await;
            false
        }
    }
}

/// Why [`RetryExecutor::execute`] gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Every attempt failed; `last` is the error of the final one.
    Exhausted { attempts: u32, last: E },
    /// The backoff sleep was cancelled.
    Interrupted,
}

/// Bounded-attempt executor with capped exponential backoff.
#[derive(Clone, Copy, Debug)]
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: Option<&'a CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs `operation` until it succeeds or `max_attempts` attempts failed.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.policy.max_attempts => {
                    tracing::warn!(operation, attempt, error = %err, "retry budget exhausted");
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff_interval(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    if sleep_or_cancel(delay, self.cancel).await {
                        return Err(RetryFailure::Interrupted);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Per-loop retry state of the readiness polls.
///
/// The counter starts at 1 and the loop may retry while it stays within
/// `max_attempts`. The sleep grows by `floor(multiplier)` after every
/// failed observation, without an upper bound.
#[derive(Debug)]
pub struct PollBackoff {
    attempt: u32,
    max_attempts: u32,
    current_sleep_ms: u64,
    growth: u64,
}

impl PollBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts,
            current_sleep_ms: policy.sleep_time_ms,
            growth: policy.multiplier.trunc() as u64,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries already slept through.
    pub fn retries(&self) -> u32 {
        self.attempt - 1
    }

    pub fn exhausted(&self) -> bool {
        self.attempt > self.max_attempts
    }

    pub fn current_sleep(&self) -> Duration {
        Duration::from_millis(self.current_sleep_ms)
    }

    /// Consumes one retry: returns the delay to sleep and grows the next one.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current_sleep();
        self.current_sleep_ms = self.current_sleep_ms.saturating_mul(self.growth);
        self.attempt += 1;
        delay
    }
}
