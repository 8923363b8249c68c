//! Blockchain-send handler — signs and submits a transfer using a
//! delegated session key, after consulting the Session-Key Authority.
//!
//! Used standalone (`blockType = "BLOCKCHAIN_SEND"`) or invoked as an AI
//! agent tool; either way it must not sign before `SessionAuthority::validate`
//! has cleared the attempt.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::services::SignRequest;
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

pub struct BlockchainSendHandler;

impl BlockchainSendHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BlockchainSendHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared by the standalone handler and the AI-agent tool wrapper.
pub async fn send(config: &Value, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
    let session_key_id = config
        .get("sessionKeyId")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::ConfigInvalid("BLOCKCHAIN_SEND requires 'sessionKeyId'".into()))?;
    let session_key_id = Uuid::from_str(session_key_id)
        .map_err(|_| HandlerError::ConfigInvalid("'sessionKeyId' is not a valid UUID".into()))?;

    let operation = config
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::ConfigInvalid("BLOCKCHAIN_SEND requires 'operation'".into()))?;

    let to_address = config
        .get("toAddress")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::ConfigInvalid("BLOCKCHAIN_SEND requires 'toAddress'".into()))?;

    let amount = config
        .get("amount")
        .and_then(|v| v.as_str().map(Decimal::from_str).or_else(|| v.as_f64().map(|f| Ok(Decimal::try_from(f).unwrap_or_default()))))
        .transpose()
        .map_err(|_| HandlerError::ConfigInvalid("'amount' is not a valid decimal".into()))?
        .ok_or_else(|| HandlerError::ConfigInvalid("BLOCKCHAIN_SEND requires 'amount'".into()))?;

    let authority = ctx
        .services
        .session_authority
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no session authority configured".into()))?;

    let outcome = authority.validate(session_key_id, operation, amount, to_address).await?;
    if !outcome.is_valid {
        return Err(HandlerError::PolicyDenied(outcome.errors.join("; ")));
    }

    let signer = ctx
        .services
        .signer
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no signer configured".into()))?;

    let receipt = signer
        .send(SignRequest {
            session_key_id,
            to_address: to_address.to_string(),
            amount,
            data: None,
        })
        .await?;

    authority
        .record_usage(session_key_id, amount, to_address, Some(&receipt.transaction_hash))
        .await?;

    Ok(json!({
        "transactionHash": receipt.transaction_hash,
        "gasUsed": receipt.gas_used,
        "amount": amount.to_string(),
        "toAddress": to_address,
    }))
}

#[async_trait]
impl BlockHandler for BlockchainSendHandler {
    fn block_type(&self) -> &str {
        "BLOCKCHAIN_SEND"
    }

    async fn execute(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
        send(&node.config, ctx).await
    }
}
