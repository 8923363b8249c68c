//! AI-agent handler — a bounded `{think, tool-call, observe}` reasoning loop.
//!
//! A completed run is optionally persisted as a snapshot (`replay_store`)
//! for later replay. A node whose config carries `replayOf` re-runs against
//! that snapshot instead of starting fresh, in one of three modes:
//! `exact` reproduces the original trace verbatim, `adaptive` re-plans with
//! the original trace as context, `dry-run` re-runs the reasoning loop but
//! never invokes the tool executor.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::replay::{AgentSnapshot, ReplayMode};
use crate::services::{CompletionRequest, CompletionStep};
use crate::traits::{BlockHandler, ExecutionContext, NodeSpec};

pub struct AiAgentHandler;

impl AiAgentHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AiAgentHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockHandler for AiAgentHandler {
    fn block_type(&self) -> &str {
        "AI_AGENT"
    }

    async fn execute(&self, node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
        let config = &node.config;

        let replay_of = config
            .get("replayOf")
            .and_then(Value::as_str)
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| HandlerError::ConfigInvalid("'replayOf' is not a valid UUID".into()))?;

        let result = match replay_of {
            Some(snapshot_id) => {
                let mode = config
                    .get("replayMode")
                    .and_then(Value::as_str)
                    .unwrap_or("exact")
                    .parse::<ReplayMode>()?;

                let store = ctx
                    .services
                    .replay_store
                    .as_ref()
                    .ok_or_else(|| HandlerError::Internal("no replay store configured".into()))?;

                let original = store
                    .get(snapshot_id)
                    .await?
                    .ok_or_else(|| HandlerError::NotFound(format!("agent snapshot {snapshot_id}")))?;

                run_replay(node, ctx, &original, mode).await?
            }
            None => run_fresh(node, ctx).await?,
        };

        if let Some(store) = ctx.services.replay_store.clone() {
            let snapshot = AgentSnapshot {
                id: Uuid::new_v4(),
                execution_id: ctx.execution_id,
                node_id: node.id.clone(),
                config: config.clone(),
                steps: result.get("steps").cloned().unwrap_or(json!([])),
                tool_calls: result.get("toolCalls").cloned().unwrap_or(json!([])),
                result: result.clone(),
            };
            if let Err(e) = store.save(snapshot).await {
                warn!(node_id = %node.id, error = %e, "failed to persist agent snapshot");
            }
        }

        Ok(result)
    }
}

/// Run the reasoning loop live, optionally skipping tool side effects and
/// optionally seeding it with an earlier run's observations.
async fn reasoning_loop(
    config: &Value,
    ctx: &ExecutionContext,
    seed_observations: Vec<Value>,
    skip_tool_side_effects: bool,
) -> Result<Value, HandlerError> {
    let prompt = config
        .get("prompt")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::ConfigInvalid("AI_AGENT requires 'prompt'".into()))?
        .to_string();
    let system_prompt = config.get("systemPrompt").and_then(Value::as_str).map(str::to_string);
    let provider = config.get("provider").and_then(Value::as_str).unwrap_or("default").to_string();
    let model = config.get("model").and_then(Value::as_str).unwrap_or("default").to_string();
    let tool_names: Vec<String> = config
        .get("tools")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let step_budget = config.get("stepBudget").and_then(Value::as_u64).unwrap_or(10) as usize;

    let completion_provider = ctx
        .services
        .completion_provider
        .as_ref()
        .ok_or_else(|| HandlerError::Internal("no completion provider configured".into()))?;

    let request = CompletionRequest {
        provider,
        model,
        system_prompt,
        prompt,
        tool_names,
    };

    let started = Instant::now();
    let mut observations: Vec<Value> = seed_observations;
    let mut steps: Vec<Value> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();
    let mut final_text: Option<String> = None;
    let mut error: Option<String> = None;

    for step_index in 0..step_budget {
        if ctx.cancellation.is_cancelled() {
            error = Some("cancelled".to_string());
            break;
        }

        let step = completion_provider.next_step(&request, &observations).await?;

        match step {
            CompletionStep::Answer(text) => {
                steps.push(json!({ "index": step_index, "kind": "answer", "text": text }));
                final_text = Some(text);
                break;
            }
            CompletionStep::ToolCall { tool_name, parameters } => {
                steps.push(json!({ "index": step_index, "kind": "tool_call", "toolName": tool_name, "parameters": parameters }));

                let tool_started = Instant::now();
                let timestamp = Utc::now().to_rfc3339();

                let outcome = if skip_tool_side_effects {
                    Ok(Value::Null)
                } else {
                    match &ctx.services.tool_executor {
                        Some(executor) => executor.call(&tool_name, parameters.clone()).await,
                        None => Err(HandlerError::Internal("no tool executor configured".into())),
                    }
                };

                let response_time_ms = tool_started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(result) => {
                        tool_calls.push(json!({
                            "toolName": tool_name,
                            "parameters": parameters,
                            "result": result,
                            "success": true,
                            "error": Value::Null,
                            "skipped": skip_tool_side_effects,
                            "responseTime": response_time_ms,
                            "timestamp": timestamp,
                        }));
                        observations.push(result);
                    }
                    Err(e) => {
                        tool_calls.push(json!({
                            "toolName": tool_name,
                            "parameters": parameters,
                            "result": Value::Null,
                            "success": false,
                            "error": e.to_string(),
                            "skipped": skip_tool_side_effects,
                            "responseTime": response_time_ms,
                            "timestamp": timestamp,
                        }));
                        error = Some(e.to_string());
                        break;
                    }
                }
            }
        }
    }

    let success = final_text.is_some() && error.is_none();
    if final_text.is_none() && error.is_none() {
        error = Some("budget_exhausted".to_string());
    }

    Ok(json!({
        "text": final_text.unwrap_or_default(),
        "success": success,
        "executionTime": started.elapsed().as_millis() as u64,
        "steps": steps,
        "toolCalls": tool_calls,
        "error": error,
    }))
}

async fn run_fresh(node: &NodeSpec, ctx: &ExecutionContext) -> Result<Value, HandlerError> {
    reasoning_loop(&node.config, ctx, Vec::new(), false).await
}

async fn run_replay(
    node: &NodeSpec,
    ctx: &ExecutionContext,
    original: &AgentSnapshot,
    mode: ReplayMode,
) -> Result<Value, HandlerError> {
    match mode {
        ReplayMode::Exact => Ok(original.result.clone()),
        ReplayMode::Adaptive => {
            let seed = vec![json!({
                "priorRun": {
                    "text": original.result.get("text").cloned().unwrap_or(Value::Null),
                    "toolCalls": original.tool_calls,
                }
            })];
            reasoning_loop(&node.config, ctx, seed, false).await
        }
        ReplayMode::DryRun => reasoning_loop(&node.config, ctx, Vec::new(), true).await,
    }
}
