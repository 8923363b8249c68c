//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + orchestration).
///
/// Per-node handler failures are not wrapped here — they're recorded
/// against the failing `NodeExecution` row and the execution is marked
/// `failed` once no more nodes can run. This enum covers failures that
/// prevent the engine itself from making progress.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    /// A self-loop edge was present.
    #[error("self-loop edge on node '{0}'")]
    SelfLoop(String),

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A node's `blockType` has no registered handler. A configuration
    /// error, not a runtime lookup miss.
    #[error("unknown block type '{0}'")]
    UnknownBlockType(String),

    // ------ Execution errors ------
    /// A node failed; the whole execution is aborted once nothing else
    /// can run.
    #[error("node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },

    /// The execution was cancelled before it reached a terminal state.
    #[error("execution cancelled")]
    Cancelled,

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
