//! Bounded retry with exponential backoff for collaborator calls

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use biograph_core::{BiographError, Result, RetryConfig};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Run `f` until it succeeds, fails permanently, or the attempt budget
    /// is spent.
    ///
    /// Only transient errors are retried. Exhaustion is reported as
    /// `TransientCollaboratorFailure` carrying the last error message.
    pub async fn retry<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempts = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(operation, attempts = attempt, error = %e, "operation failed after max attempts");
                    return Err(BiographError::TransientCollaboratorFailure {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "operation failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
