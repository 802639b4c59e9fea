//! Bounded exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{FetchError, Result};

/// Retries an operation over [`FetchError::is_transient`] failures.
///
/// Permanent errors propagate untouched on the first occurrence; a
/// transient error on the final attempt is wrapped in
/// [`FetchError::RetriesExhausted`] so callers still see what ultimately
/// went wrong.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Backoff before retry number `retry` (0-indexed): `base * 2^retry`,
    /// clamped to `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or the
    /// attempt budget runs out. The closure receives the 0-indexed
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match attempt_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
