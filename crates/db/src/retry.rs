//! Bounded retry for transactions that hit a serialization conflict.
//!
//! The engine itself never retries a node — retrying is left to the
//! handler or, here, to the persistence layer, used by `session`'s
//! usage-tracking transaction, where a `SELECT ... FOR UPDATE`
//! transaction can be aborted by the database and should be retried a
//! bounded number of times rather than surfaced to the caller
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::DbError;

/// Retry `op` up to `max_attempts` times when it fails with
/// `DbError::SerializationConflict`, backing off by `base_delay * 2^n`
/// between attempts. Any other error is returned immediately.
pub async fn with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                attempt += 1;
                let delay = base_delay * 2u32.pow(attempt.saturating_sub(1));
                warn!(attempt, max_attempts, ?delay, "retrying after serialization conflict");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
