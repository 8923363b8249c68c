//! Execution log repository functions. Append-only: there is no update
//! or delete here, matching `ExecutionLog`'s append-only contract.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ExecutionLogRow, DbError};

/// Append a log line to an execution, optionally scoped to a node.
pub async fn append_log(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: Option<&str>,
    level: &str,
    message: &str,
    data: Option<serde_json::Value>,
) -> Result<ExecutionLogRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        INSERT INTO execution_logs (id, execution_id, node_id, level, message, data, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, execution_id, node_id, level, message, data, timestamp
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(level)
    .bind(message)
    .bind(data)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Fetch the full log stream for an execution, oldest first.
pub async fn list_logs(pool: &PgPool, execution_id: Uuid) -> Result<Vec<ExecutionLogRow>, DbError> {
    sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        SELECT id, execution_id, node_id, level, message, data, timestamp
        FROM execution_logs WHERE execution_id = $1 ORDER BY timestamp ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}
