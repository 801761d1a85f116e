//! Fixed-budget retry for calls to external services.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, delay: Duration::ZERO }
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        is_transient: P,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts && is_transient(&error) => {
                    warn!(
                        event_name = "retry.attempt_failed",
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error = %error,
                        "transient failure; retrying"
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
