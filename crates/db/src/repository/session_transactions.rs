//! Session-transaction repository functions.
//!
//! Recorded after a session key successfully signs and submits an
//! on-chain action; consumed by the Session Monitor's spending,
//! velocity, and pattern checks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::SessionTransactionRow, DbError};

/// Record a successful on-chain action against a session key.
pub async fn record_transaction(
    pool: &PgPool,
    session_key_id: Uuid,
    amount: Decimal,
    to_address: &str,
    transaction_hash: Option<&str>,
) -> Result<SessionTransactionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, SessionTransactionRow>(
        r#"
        INSERT INTO session_transactions (id, session_key_id, amount, to_address, transaction_hash, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, session_key_id, amount, to_address, transaction_hash, created_at
        "#,
    )
    .bind(id)
    .bind(session_key_id)
    .bind(amount)
    .bind(to_address)
    .bind(transaction_hash)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Record a successful on-chain action within an open transaction (used by
/// `record_usage`, which writes the usage update, the `used` event, and
/// this row atomically).
pub async fn record_transaction_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_key_id: Uuid,
    amount: Decimal,
    to_address: &str,
    transaction_hash: Option<&str>,
) -> Result<(), DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO session_transactions (id, session_key_id, amount, to_address, transaction_hash, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(session_key_id)
    .bind(amount)
    .bind(to_address)
    .bind(transaction_hash)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(())
}

/// List transactions for a session key created since `since`, used by
/// the monitor's 24h spending window, 5-minute/1-hour velocity windows,
/// and pattern detection.
pub async fn list_since(
    pool: &PgPool,
    session_key_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<SessionTransactionRow>, DbError> {
    sqlx::query_as::<_, SessionTransactionRow>(
        r#"
        SELECT id, session_key_id, amount, to_address, transaction_hash, created_at
        FROM session_transactions
        WHERE session_key_id = $1 AND created_at >= $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_key_id)
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}
