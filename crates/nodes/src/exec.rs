//! The engine-guaranteed wrapper around every `BlockHandler::execute` call.
//!
//! Every block handler must, before returning, have a `NodeExecution` row
//! opened, at least one `info` log for entry and exit, an `error` log on
//! failure, and the row closed with the final status. Handlers only
//! implement their own logic; this function is the single place that
//! contract is fulfilled, so individual handlers cannot forget a step.

use std::time::Duration;

use db::DbPool;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

/// Run `handler` against `node`, honouring the persistence and logging
/// contract. `timeout` is the per-`blockType` wall-clock budget;
/// exceeding it surfaces as [`HandlerError::HandlerTimeout`] and still
/// closes the `NodeExecution` row as `failed`.
#[instrument(skip(pool, handler, node, ctx), fields(node_id = %node.id, block_type = %node.block_type))]
pub async fn wrap_execution(
    pool: &DbPool,
    handler: &dyn BlockHandler,
    node: &NodeSpec,
    ctx: &ExecutionContext,
    timeout: Duration,
) -> Result<Value, HandlerError> {
    let row = db::repository::executions::start_node_execution(
        pool,
        ctx.execution_id,
        &node.id,
        &node.block_type,
    )
    .await
    .map_err(|e| HandlerError::Internal(format!("failed to open node execution: {e}")))?;

    log_entry(pool, ctx.execution_id, &node.id, "info", "node started", None).await;

    let outcome = tokio::time::timeout(timeout, handler.execute(node, ctx)).await;

    let result = match outcome {
        Ok(inner) => inner,
        Err(_) => Err(HandlerError::HandlerTimeout(format!(
            "node '{}' exceeded its {:?} budget",
            node.id, timeout
        ))),
    };

    match &result {
        Ok(output) => {
            close_node_execution(pool, row.id, "completed", Some(output.clone()), None).await;
            log_entry(pool, ctx.execution_id, &node.id, "info", "node completed", Some(output.clone())).await;
        }
        Err(err) => {
            close_node_execution(pool, row.id, "failed", None, Some(err.to_string())).await;
            log_entry(
                pool,
                ctx.execution_id,
                &node.id,
                "error",
                "node failed",
                Some(serde_json::json!({ "error": err.to_string() })),
            )
            .await;
        }
    }

    result
}

async fn close_node_execution(
    pool: &DbPool,
    node_execution_id: Uuid,
    status: &str,
    output: Option<Value>,
    error: Option<String>,
) {
    if let Err(e) =
        db::repository::executions::finish_node_execution(pool, node_execution_id, status, output, error).await
    {
        tracing::error!("failed to close node execution {node_execution_id}: {e}");
    }
}

async fn log_entry(
    pool: &DbPool,
    execution_id: Uuid,
    node_id: &str,
    level: &str,
    message: &str,
    data: Option<Value>,
) {
    // Logging must never fail the main flow, so failures here are swallowed.
    if let Err(e) = db::repository::logs::append_log(pool, execution_id, Some(node_id), level, message, data).await
    {
        tracing::error!("failed to append execution log: {e}");
    }
}
