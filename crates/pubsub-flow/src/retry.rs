//! Retry policy for provider operations that may fail transiently.
//!
//! Only errors for which [`ProviderError::is_transient`](crate::error::ProviderError::is_transient) holds are retried. The
//! default policy makes a single attempt, so a failure surfaces immediately
//! unless the caller configures retries.

use crate::error::RetriesExhausted;
use crate::operation::AsyncOperation;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// How many times to issue an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Exponential backoff starting at `initial_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            backoff_multiplier: 2.0,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay_ms.max(self.initial_delay_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Issues `issue()` until it succeeds, fails permanently, or the policy runs out.
pub async fn retry_operation<T, F>(
    operation: &'static str,
    policy: &RetryPolicy,
    mut issue: F,
) -> Result<T, RetriesExhausted>
where
    F: FnMut() -> AsyncOperation<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match issue().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                debug!(operation, attempt, max_attempts, ?delay, error = %error, "Retrying");
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(RetriesExhausted {
                    operation,
                    attempts: attempt,
                    source,
                })
            }
        }
    }
}
