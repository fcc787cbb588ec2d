//! Bounded retry with exponential backoff for upstream fetches.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::source::SourceError;

/// How many times to try an upstream call and how long to wait in between.
///
/// `max_attempts` counts the first try. The delay before attempt `n + 1` is
/// `base_delay * 2^(n - 1)` capped at `max_delay`, scaled by a random factor
/// in `[0.8, 1.2)` when jitter is enabled. Setting `base_delay == max_delay`
/// gives a fixed delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            jitter: true,
        }
    }
}

/// A call that did not succeed within the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    /// Attempts actually made, including the first.
    pub attempts: u32,
    pub error: SourceError,
}

impl RetryPolicy {
    /// A policy with a fixed delay and no jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            jitter: false,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(30);
        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;
        let capped = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        if !self.jitter {
            return Duration::from_millis(capped);
        }
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_attempts || !error.is_retryable() {
                        return Err(RetryFailure {
                            attempts: attempt,
                            error,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        "{} request failed (attempt {}/{}): {}; retrying in {:.1}s",
                        label,
                        attempt,
                        max_attempts,
                        error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
