//! Workflow CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

/// Insert a new workflow into the database.
///
/// `definition` must be a valid JSON object produced by serialising the
/// domain `Workflow` type from the `engine` crate.
pub async fn create_workflow(
    pool: &PgPool,
    name: &str,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflows (id, name, definition, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, definition, created_at
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(definition)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, definition, created_at FROM workflows WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_sqlx)?
    .ok_or(DbError::NotFound)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, definition, created_at FROM workflows ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(DbError::from_sqlx)?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
