//! services/studio/src/cache/retry.rs
//!
//! Bounded retries with exponential backoff for transient failures.
//!
//! Only errors for which `StudioError::is_retryable` holds (network trouble,
//! timeouts and 5xx answers) are retried. Generation and edit calls are not
//! idempotent on the backend and use `RetryPolicy::none()`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::StudioResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Queries: up to three attempts.
    pub fn reads() -> Self {
        Self {
            max_attempts: 3,
            ..Self::none()
        }
    }

    /// Idempotent-enough mutations: up to two attempts.
    pub fn mutations() -> Self {
        Self {
            max_attempts: 2,
            ..Self::none()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `attempt` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op: &str, mut attempt: F) -> StudioResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StudioResult<T>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retry + 1 < self.max_attempts => {
                    let delay = self.delay_for(retry);
                    warn!(op, attempt = retry + 1, ?delay, error = %e, "Transient failure, retrying.");
                    sleep(delay).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }
}
