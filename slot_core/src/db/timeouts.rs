//! Deadlines for database operations.
//!
//! Every ledger and history query goes through one of these wrappers so a stalled
//! connection surfaces as an error instead of blocking a session actor.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Deadline for a single statement
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for `BEGIN` and `COMMIT` of a ledger unit
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// Await `future`, failing with [`TimeoutError::Timeout`] once `limit` passes.
///
/// ```no_run
/// use slot_core::db::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// # async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let row = with_timeout(
///     DEFAULT_QUERY_TIMEOUT,
///     sqlx::query("SELECT balance FROM wallets WHERE user_id = $1")
///         .bind(1_i64)
///         .fetch_optional(pool),
/// )
/// .await?;
/// # let _ = row;
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> TimeoutResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    timeout(limit, future)
        .await
        .map_err(|_| TimeoutError::Timeout(limit))?
        .map_err(TimeoutError::Database)
}

pub async fn with_default_timeout<F, T>(future: F) -> TimeoutResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

pub async fn with_transaction_timeout<F, T>(future: F) -> TimeoutResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_TRANSACTION_TIMEOUT, future).await
}
