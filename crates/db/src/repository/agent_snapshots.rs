//! Persistence for AI-agent reasoning-trace snapshots.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::AgentSnapshotRow, DbError};

/// Append a new snapshot for `(execution_id, node_id)`.
pub async fn insert(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
    config: serde_json::Value,
    steps: serde_json::Value,
    tool_calls: serde_json::Value,
    result: serde_json::Value,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO agent_snapshots (id, execution_id, node_id, config, steps, tool_calls, result, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(config)
    .bind(steps)
    .bind(tool_calls)
    .bind(result)
    .bind(now)
    .execute(pool)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(id)
}

/// Fetch a snapshot by id.
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<AgentSnapshotRow>, DbError> {
    sqlx::query_as::<_, AgentSnapshotRow>(
        r#"SELECT id, execution_id, node_id, config, steps, tool_calls, result, created_at
           FROM agent_snapshots WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Fetch the most recent snapshot recorded for a given node within an execution.
pub async fn latest_for_node(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
) -> Result<Option<AgentSnapshotRow>, DbError> {
    sqlx::query_as::<_, AgentSnapshotRow>(
        r#"
        SELECT id, execution_id, node_id, config, steps, tool_calls, result, created_at
        FROM agent_snapshots
        WHERE execution_id = $1 AND node_id = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(execution_id)
    .bind(node_id)
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_sqlx)
}
