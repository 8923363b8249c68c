//! Port traits for the external collaborators handlers need.
//!
//! These mirror the platform's own "treated as opaque capabilities" stance
//! on the concrete LLM provider, blockchain RPC stack, and session-key
//! authority: handlers depend only on these traits, never on a concrete SDK.
//! Concrete adapters are wired in by the process that assembles a
//! [`Services`] value (the `engine`/`session`/`cli` crates).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::replay::ReplayStore;

/// Outcome of a session-key pre-transaction validation check.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub remaining_daily_amount: Option<Decimal>,
}

/// The subset of the Session-Key Authority a handler needs to consult
/// before it signs anything on chain.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    async fn validate(
        &self,
        session_key_id: uuid::Uuid,
        operation: &str,
        amount: Decimal,
        to_address: &str,
    ) -> Result<ValidationOutcome, HandlerError>;

    async fn record_usage(
        &self,
        session_key_id: uuid::Uuid,
        amount: Decimal,
        to_address: &str,
        tx_hash: Option<&str>,
    ) -> Result<(), HandlerError>;
}

/// A decimal-amount on-chain transfer, already authorized by `SessionAuthority`.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub session_key_id: uuid::Uuid,
    pub to_address: String,
    pub amount: Decimal,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SignReceipt {
    pub transaction_hash: String,
    pub gas_used: Option<u64>,
}

/// Signs and submits a transaction using a session key's decrypted private
/// key. The concrete chain RPC stack is an opaque external collaborator.
#[async_trait]
pub trait SignerProvider: Send + Sync {
    async fn send(&self, request: SignRequest) -> Result<SignReceipt, HandlerError>;
}

/// DeFi protocol action, as validated by the `DEFI_POSITION` handler's schema.
#[derive(Debug, Clone)]
pub struct ProtocolAction {
    pub protocol: String,
    pub action: String,
    pub wallet_id: String,
    pub params: Value,
}

#[derive(Debug, Clone)]
pub struct ProtocolReceipt {
    pub transaction_hash: String,
    pub gas_used: Option<u64>,
    pub balances_before: Value,
    pub balances_after: Value,
}

/// The external DeFi protocol SDK, kept opaque behind this trait.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn submit(&self, action: ProtocolAction) -> Result<ProtocolReceipt, HandlerError>;
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub tool_names: Vec<String>,
}

/// One step of a model's reasoning: either a terminal answer or a tool call.
#[derive(Debug, Clone)]
pub enum CompletionStep {
    Answer(String),
    ToolCall { tool_name: String, parameters: Value },
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn next_step(
        &self,
        request: &CompletionRequest,
        prior_observations: &[Value],
    ) -> Result<CompletionStep, HandlerError>;
}

/// Executes a named tool with JSON parameters and returns its JSON result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, tool_name: &str, parameters: Value) -> Result<Value, HandlerError>;
}

/// Sink for a handler's own `ExecutionLog` entries, layered on top of the
/// entry/exit logs the engine's wrapper already writes.
#[async_trait]
pub trait NodeLogger: Send + Sync {
    async fn log(&self, level: &str, message: &str, data: Option<Value>);
}

/// External collaborators available to a handler at execution time. Every
/// field is optional: a handler that needs a missing service fails with
/// [`HandlerError::Internal`] rather than panicking.
#[derive(Clone, Default)]
pub struct Services {
    pub http: Option<reqwest::Client>,
    pub session_authority: Option<Arc<dyn SessionAuthority>>,
    pub signer: Option<Arc<dyn SignerProvider>>,
    pub protocol_adapter: Option<Arc<dyn ProtocolAdapter>>,
    pub completion_provider: Option<Arc<dyn CompletionProvider>>,
    pub tool_executor: Option<Arc<dyn ToolExecutor>>,
    pub logger: Option<Arc<dyn NodeLogger>>,
    /// Optional snapshot/replay persistence for `AI_AGENT` nodes.
    pub replay_store: Option<Arc<dyn ReplayStore>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("http", &self.http.is_some())
            .field("session_authority", &self.session_authority.is_some())
            .field("signer", &self.signer.is_some())
            .field("protocol_adapter", &self.protocol_adapter.is_some())
            .field("completion_provider", &self.completion_provider.is_some())
            .field("tool_executor", &self.tool_executor.is_some())
            .field("logger", &self.logger.is_some())
            .field("replay_store", &self.replay_store.is_some())
            .finish()
    }
}
