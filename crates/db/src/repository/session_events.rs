//! Session-event queries beyond the composite writes in `session_keys.rs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::SessionEventRow, DbError};

/// List events for a session key ordered by time, via the
/// `(session_key_id, timestamp)` index.
pub async fn list_for_session(pool: &PgPool, session_key_id: Uuid) -> Result<Vec<SessionEventRow>, DbError> {
    sqlx::query_as::<_, SessionEventRow>(
        r#"
        SELECT id, session_key_id, event_type, event_data, severity, timestamp
        FROM session_events WHERE session_key_id = $1 ORDER BY timestamp ASC
        "#,
    )
    .bind(session_key_id)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Count events of a given severity across all session keys since `since`,
/// used for the monitor's `alertsLast24h` metric.
pub async fn count_since(pool: &PgPool, severity: &str, since: DateTime<Utc>) -> Result<i64, DbError> {
    let row: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM session_events WHERE severity = $1 AND timestamp >= $2"#,
    )
    .bind(severity)
    .bind(since)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(row.0)
}

/// Count events grouped by `event_type` since `since`, used to compute
/// `topAlertTypes`.
pub async fn count_by_type_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<(String, i64)>, DbError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT event_type, COUNT(*) as count
        FROM session_events
        WHERE timestamp >= $1
        GROUP BY event_type
        ORDER BY count DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(rows)
}
