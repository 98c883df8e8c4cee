//! Exponential backoff with jitter for remote calls.
//!
//! Every model call and every spreadsheet/slide request goes through
//! [`with_retry`]. Only failures the port classified as
//! [`ErrorClass::RateLimited`] are retried (plus [`ErrorClass::Transient`] when
//! the policy opts in); permanent failures return on the first attempt.
//!
//! With the defaults the wait sequence is roughly 1 s → 2 s → 4 s → 8 s, each
//! delay shifted by up to ±25 % so concurrent requests do not re-hit the quota
//! in lock-step.

use crate::error::{ErrorClass, PortError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 5.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds. Default: 1000.
    pub base_delay_ms: u64,
    /// Multiplier applied for each further attempt. Default: 2.0.
    pub backoff_factor: f64,
    /// Upper bound for a single delay, in milliseconds. Default: 32 000.
    pub max_delay_ms: u64,
    /// Shift each delay by a random ±25 %. Default: true.
    pub jitter: bool,
    /// Also retry [`ErrorClass::Transient`] failures. Default: false.
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 32_000,
            jitter: true,
            retry_transient: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (1-indexed; attempt 1 never waits).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let raw = self.base_delay_ms as f64 * self.backoff_factor.powi((attempt - 2) as i32);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0) as u64;

        let delay_ms = if self.jitter && capped >= 4 {
            let spread = capped / 4;
            let offset = rand::thread_rng().gen_range(0..=spread * 2) as i64 - spread as i64;
            (capped as i64 + offset).max(0) as u64
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }

    fn is_retryable(&self, class: ErrorClass) -> bool {
        match class {
            ErrorClass::RateLimited => true,
            ErrorClass::Transient => self.retry_transient,
            ErrorClass::Permanent => false,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// The returned error carries the number of attempts made in
/// [`PortError::attempts`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(mut err) => {
                err.attempts = attempt;
                if !policy.is_retryable(err.class) || attempt >= max_attempts {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    service = %err.service,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{what}: {:?} failure, backing off: {}",
                    err.class,
                    err.message
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
