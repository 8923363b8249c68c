//! Execution and node-execution repository functions.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{NodeExecutionRow, WorkflowExecutionRow},
    DbError,
};

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Create a new workflow execution record in `pending` status.
pub async fn create_execution(
    pool: &PgPool,
    workflow_id: Uuid,
    input: serde_json::Value,
) -> Result<WorkflowExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        INSERT INTO workflow_executions (id, workflow_id, status, input, started_at)
        VALUES ($1, $2, 'pending', $3, $4)
        RETURNING id, workflow_id, status, input, output, error, started_at, finished_at
        "#,
    )
    .bind(id)
    .bind(workflow_id)
    .bind(input)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<WorkflowExecutionRow, DbError> {
    sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        SELECT id, workflow_id, status, input, output, error, started_at, finished_at
        FROM workflow_executions WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_sqlx)?
    .ok_or(DbError::NotFound)
}

/// List executions by status, using the `workflow_execution(status)` index.
pub async fn list_executions_by_status(
    pool: &PgPool,
    status: &str,
) -> Result<Vec<WorkflowExecutionRow>, DbError> {
    sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        SELECT id, workflow_id, status, input, output, error, started_at, finished_at
        FROM workflow_executions WHERE status = $1
        "#,
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Transition an execution to `running`.
pub async fn mark_running(pool: &PgPool, execution_id: Uuid) -> Result<(), DbError> {
    sqlx::query(r#"UPDATE workflow_executions SET status = 'running' WHERE id = $1"#)
        .bind(execution_id)
        .execute(pool)
        .await
        .map_err(DbError::from_sqlx)?;
    Ok(())
}

/// Transition an execution to a terminal state (`completed`, `failed`, or
/// `paused`), recording `output`/`error` and `finished_at` when terminal.
pub async fn finish_execution(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    output: Option<serde_json::Value>,
    error: Option<String>,
) -> Result<(), DbError> {
    let finished_at = if status == "paused" { None } else { Some(Utc::now()) };

    sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $1, output = $2, error = $3, finished_at = $4
        WHERE id = $5
        "#,
    )
    .bind(status)
    .bind(output)
    .bind(error)
    .bind(finished_at)
    .bind(execution_id)
    .execute(pool)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// node_executions
// ---------------------------------------------------------------------------

/// Open a node execution row at `running` status. Must be called before
/// the handler runs, per the engine's persistence contract.
pub async fn start_node_execution(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
    block_type: &str,
) -> Result<NodeExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, NodeExecutionRow>(
        r#"
        INSERT INTO node_executions
            (id, execution_id, node_id, block_type, status, start_time)
        VALUES ($1, $2, $3, $4, 'running', $5)
        RETURNING id, execution_id, node_id, block_type, status, start_time, end_time, output, error
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(block_type)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Close a node execution row as `completed` or `failed`.
pub async fn finish_node_execution(
    pool: &PgPool,
    node_execution_id: Uuid,
    status: &str,
    output: Option<serde_json::Value>,
    error: Option<String>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE node_executions
        SET status = $1, output = $2, error = $3, end_time = $4
        WHERE id = $5
        "#,
    )
    .bind(status)
    .bind(output)
    .bind(error)
    .bind(Utc::now())
    .bind(node_execution_id)
    .execute(pool)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(())
}

/// Fetch every node execution row for an execution, used to check whether
/// a `completed` workflow execution has a `completed` row for every node.
pub async fn list_node_executions(
    pool: &PgPool,
    execution_id: Uuid,
) -> Result<Vec<NodeExecutionRow>, DbError> {
    sqlx::query_as::<_, NodeExecutionRow>(
        r#"
        SELECT id, execution_id, node_id, block_type, status, start_time, end_time, output, error
        FROM node_executions WHERE execution_id = $1
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}
