//! Retry-on-lock policy applied around every database call.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a call that did not succeed under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted { operation: String, attempts: u32 },
    /// A non-retryable error; returned as soon as it was seen.
    Fatal(E),
}

/// Bounded exponential backoff: attempt `n` (0-based) that fails with a
/// retryable error waits `base_delay * 2^n` before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget is spent.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) => {
                    if attempt + 1 < self.max_attempts {
                        let delay = self.backoff(attempt);
                        debug!(
                            "{operation}: database locked (attempt {}), retrying in {delay:?}",
                            attempt + 1
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(RetryError::Fatal(e)),
            }
        }

        warn!(
            "{operation}: giving up after {} locked attempts",
            self.max_attempts
        );
        Err(RetryError::Exhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Whether a sqlx error is SQLite reporting lock contention
/// (`SQLITE_BUSY` / `SQLITE_LOCKED`, including extended codes).
pub fn is_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let locked_code = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false);
            locked_code || db.message().to_lowercase().contains("database is locked")
        }
        _ => false,
    }
}
