//! Exponential backoff for retrying fallible async calls
//!
//! The core never retries on its own: callers opt in by passing a
//! `RetryPolicy` (e.g. `PollConfig::retry` for transient poll failures).
//! Cancellation is the caller's concern; wrap the whole `retry` future in
//! a `tokio::select!` against the caller's cancellation signal.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Backoff schedule: `initial_delay * 2^retry`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Zero behaves as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy's
/// attempts are used up. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
