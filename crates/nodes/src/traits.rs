//! The `BlockHandler` trait — the contract every block type must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::services::Services;

/// A single node as handed to its handler: `config` has already been
/// template-resolved against `previousOutputs` by the engine.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub id: String,
    pub block_type: String,
    pub config: Value,
}

/// Shared context passed to every handler during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual
/// handler implementations can import it without a circular dependency.
#[derive(Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub user_id: Option<String>,
    /// Initial input supplied when the execution was triggered.
    pub workflow_data: Value,
    /// Outputs of every predecessor, in scheduling order.
    pub previous_outputs: Vec<(String, Value)>,
    pub services: Services,
    pub cancellation: CancellationToken,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow_id", &self.workflow_id)
            .field("execution_id", &self.execution_id)
            .field("user_id", &self.user_id)
            .field("previous_outputs", &self.previous_outputs.len())
            .finish()
    }
}

/// The core handler trait. One implementation per `blockType`, registered
/// into a [`crate::registry::BlockRegistry`] at startup.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    /// The `blockType` string this handler answers to.
    fn block_type(&self) -> &str;

    /// Execute the node and return its JSON output.
    async fn execute(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError>;
}
