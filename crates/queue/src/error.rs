//! Queue-worker error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("workflow definition for job is not valid JSON: {0}")]
    InvalidWorkflowDefinition(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),
}
