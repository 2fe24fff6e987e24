//! Backoff for flaky remote calls
//!
//! Completion endpoints throttle and time out under load. Each VM's model
//! call runs inside a `RetryPolicy`; only errors that report themselves as
//! retryable (`IsRetryable`) are attempted again.

use crate::error::{IsRetryable, Result, SizectlError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs an operation until it succeeds, fails permanently or runs out of attempts
#[allow(async_fn_in_trait)]
pub trait RetryPolicy: Send + Sync {
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send;
}

/// Doubling delays with jitter, capped
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    attempts: u32,
    base_delay: Duration,
    delay_cap: Duration,
    jitter: f64,
}

impl ExponentialBackoffPolicy {
    /// `attempts` counts the first call; zero is treated as one
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay: Duration::from_millis(100),
            delay_cap: Duration::from_secs(30),
            jitter: 0.1,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, cap: Duration) -> Self {
        self.delay_cap = cap;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry, capped, plus up to 10% jitter
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let capped_ms = (base_ms * 2f64.powi(retry as i32)).min(self.delay_cap.as_millis() as f64);
        // Spread concurrent VMs so they do not hit the endpoint in lockstep
        let spread_ms = capped_ms * self.jitter * fastrand::f64();
        Duration::from_millis((capped_ms + spread_ms) as u64)
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, self.attempts);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.attempts {
                warn!("Giving up after {} attempts: {}", attempt, err);
                return Err(SizectlError::Retryable {
                    attempt,
                    max_attempts: self.attempts,
                    reason: err.to_string(),
                    source: Some(Box::new(err)),
                });
            }

            let delay = self.calculate_backoff(attempt - 1);
            warn!(
                "Attempt {}/{} failed, retrying in {:?}: {}",
                attempt, self.attempts, delay, err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Single attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        operation().await
    }
}
