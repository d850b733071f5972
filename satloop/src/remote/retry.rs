//! Shared retry policy: exponential backoff with jitter.

use super::types::{FetchError, RemoteError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff policy shared by both remote backends.
///
/// Attempt `n` (1-based) sleeps `base * 2^(n-1)`, scaled by a random
/// jitter factor and capped at `max_delay`. Only retryable errors
/// (rate limits, transient network/server failures) consume attempts;
/// `NotFound` and fatal errors surface immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Jitter ratio: each delay is scaled by `1 ± jitter`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 4,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Returns the backoff delay after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let uncapped = self.base_delay.saturating_mul(1u32 << exp);
        let capped = uncapped.min(self.max_delay);

        if self.jitter <= 0.0 || capped.is_zero() {
            return capped;
        }

        let factor = 1.0 + self.jitter * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
        capped.mul_f64(factor.max(0.0)).min(self.max_delay)
    }

    /// Runs `op` under this policy, returning the value and the number of
    /// attempts made (including the successful one).
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<(T, u32), FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok((value, attempts)),
                Err(RemoteError::NotFound) => return Err(FetchError::NotFound),
                Err(RemoteError::Fatal(msg)) => return Err(FetchError::Fatal(msg)),
                Err(err) if attempts < self.max_attempts => {
                    let delay = self.delay_after(attempts);
                    warn!(
                        what,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(FetchError::Exhausted {
                        attempts,
                        last_error: err.to_string(),
                    })
                }
            }
        }
    }
}
