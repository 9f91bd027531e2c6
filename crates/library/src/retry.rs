//! Bounded retries for transient storage failures.

use camkeep_storage::error::Result as StorageResult;
use std::ops::Deref;
use std::time::Duration;

/// How often and how patiently a single file operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after that.
    pub backoff: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}
impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with an error that is not
    /// [retryable](camkeep_storage::error::ErrorKind::is_retryable), or runs
    /// out of attempts. The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    tracing::debug!(attempt, delay_ms = delay.as_millis(), error = %e.deref(), "Transient failure; retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                },
                result => return result,
            }
        }
    }
}
