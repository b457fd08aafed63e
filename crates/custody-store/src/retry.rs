//! Bounded exponential backoff for block persistence.
//!
//! `delay = initial_delay_ms * multiplier^(attempt-1)`, clamped to
//! `max_delay_ms`. Only errors that [`StoreError::is_transient`] reports
//! as retryable are retried; everything else fails on the first attempt.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Retry-with-backoff settings for a single persistence operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplicative factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 200,
        }
    }
}

/// The operation failed on every permitted attempt (or failed permanently).
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {source}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

impl RetryPolicy {
    /// Delay in milliseconds before retry number `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let max = self.max_delay_ms as f64;
        if base.is_nan() || base < 0.0 {
            0
        } else if base > max {
            self.max_delay_ms
        } else {
            base as u64
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(source) if !source.is_transient() || attempt >= max_attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, max_attempts, delay_ms = delay, error = %err, "retrying block write");
                    thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
            }
        }
    }
}
