//! DeFi position handler — create/adjust/close/monitor a liquidity or
//! lending position through an external protocol adapter.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::services::ProtocolAction;
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

pub struct DefiPositionHandler;

impl DefiPositionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefiPositionHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn require_str<'a>(config: &'a Value, field: &str) -> Result<&'a str, HandlerError> {
    config
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::ConfigInvalid(format!("DEFI_POSITION requires '{field}'")))
}

#[async_trait]
impl BlockHandler for DefiPositionHandler {
    fn block_type(&self) -> &str {
        "DEFI_POSITION"
    }

    async fn execute(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
        let config = &node.config;

        let protocol = require_str(config, "protocol")?.to_string();
        let action = require_str(config, "action")?.to_string();
        if !["create", "adjust", "close", "monitor"].contains(&action.as_str()) {
            return Err(HandlerError::ConfigInvalid(format!(
                "DEFI_POSITION 'action' must be one of create|adjust|close|monitor, got '{action}'"
            )));
        }

        let wallet_id = require_str(config, "walletId")?.to_string();
        let slippage = config.get("slippage").and_then(Value::as_f64).unwrap_or(0.01);
        let deadline_minutes = config.get("deadline").and_then(Value::as_i64).unwrap_or(30);

        if action == "create" {
            require_str(config, "tokenA")?;
            require_str(config, "tokenB")?;
            if config.get("amounts").is_none() {
                return Err(HandlerError::ConfigInvalid("DEFI_POSITION create requires 'amounts'".into()));
            }
            if config.get("priceRange").is_none() {
                return Err(HandlerError::ConfigInvalid("DEFI_POSITION create requires 'priceRange'".into()));
            }
        } else {
            require_str(config, "positionId")?;
        }

        let adapter = ctx
            .services
            .protocol_adapter
            .as_ref()
            .ok_or_else(|| HandlerError::Internal("no protocol adapter configured".into()))?;

        let params = json!({
            "tokenA": config.get("tokenA"),
            "tokenB": config.get("tokenB"),
            "amounts": config.get("amounts"),
            "priceRange": config.get("priceRange"),
            "slippage": slippage,
            "deadlineMinutes": deadline_minutes,
            "positionId": config.get("positionId"),
        });

        let receipt = adapter
            .submit(ProtocolAction {
                protocol: protocol.clone(),
                action: action.clone(),
                wallet_id,
                params,
            })
            .await
            .map_err(|e| match e {
                HandlerError::NotFound(m) => HandlerError::NotFound(m),
                other => HandlerError::UpstreamError(other.to_string()),
            })?;

        Ok(json!({
            "action": action,
            "positionId": config.get("positionId").cloned().unwrap_or(Value::Null),
            "amounts": config.get("amounts").cloned().unwrap_or(Value::Null),
            "balancesBefore": receipt.balances_before,
            "balancesAfter": receipt.balances_after,
            "transactionHash": receipt.transaction_hash,
            "gasUsed": receipt.gas_used,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
