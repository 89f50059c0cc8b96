//! Fixed-delay retries for database calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::PgResult;

/// How many times to retry a failed database call, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub count: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(count: u32, delay: Duration) -> Self {
        Self { count, delay }
    }

    /// One attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Run `op` until it succeeds, retrying retryable errors up to `policy.count` times.
///
/// Before each retry `recover` runs (typically dropping a broken connection),
/// then we sleep for `policy.delay`. Errors that are not
/// [retryable](crate::PgError::is_retryable) are returned at once. When the
/// budget is spent the error of the last attempt is returned unchanged.
pub async fn retry<T, Op, Fut, Rec, RecFut>(
    policy: &RetryPolicy,
    mut op: Op,
    mut recover: Rec,
) -> PgResult<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = PgResult<T>>,
    Rec: FnMut() -> RecFut,
    RecFut: Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.count => {
                attempt += 1;
                warn!(
                    error = %e,
                    attempt,
                    retries = policy.count,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Database call failed, retrying"
                );
                recover().await;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
