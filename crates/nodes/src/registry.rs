//! Maps `blockType` strings to their registered handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{AiAgentHandler, BlockchainSendHandler, DefiPositionHandler, WebhookHandler};
use crate::traits::BlockHandler;

/// A mapping `blockType → Handler` established at startup.
#[derive(Clone, Default)]
pub struct BlockRegistry {
    handlers: HashMap<String, Arc<dyn BlockHandler>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(handler.block_type().to_string(), handler);
    }

    pub fn get(&self, block_type: &str) -> Option<Arc<dyn BlockHandler>> {
        self.handlers.get(block_type).cloned()
    }
}

/// The registry the process bootstrap wires up at startup: every built-in
/// `blockType` this workspace ships. A plugin host that wants additional
/// block types starts from this and calls `register` for each extra
/// handler.
pub fn default_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry.register(Arc::new(WebhookHandler::new()));
    registry.register(Arc::new(AiAgentHandler::new()));
    registry.register(Arc::new(BlockchainSendHandler::new()));
    registry.register(Arc::new(DefiPositionHandler::new()));
    registry
}
