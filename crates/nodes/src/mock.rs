//! `MockHandler` — a test double for `BlockHandler`.
//!
//! Useful in unit and integration tests where a real handler implementation
//! is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::error::HandlerError;
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with the given error.
    Fail(HandlerError),
}

/// A mock handler that records every call it receives and returns a
/// programmer-specified result. Registers under whatever `block_type` it's
/// constructed with.
pub struct MockHandler {
    pub block_type: String,
    pub behaviour: MockBehaviour,
    /// All configs seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockHandler {
    pub fn returning(block_type: impl Into<String>, value: Value) -> Self {
        Self {
            block_type: block_type.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(block_type: impl Into<String>, err: HandlerError) -> Self {
        Self {
            block_type: block_type.into(),
            behaviour: MockBehaviour::Fail(err),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BlockHandler for MockHandler {
    fn block_type(&self) -> &str {
        &self.block_type
    }

    async fn execute(&self, node: &NodeSpec, _ctx: &ExecutionContext) -> Result<Value, HandlerError> {
        self.calls.lock().unwrap().push(node.config.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                let mut out = json!({ "node": node.id.clone() });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(out)
            }
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}
