//! Workflow execution engine.
//!
//! `WorkflowExecutor` drives a single [`Workflow`] to a terminal state:
//! 1. Validates the DAG and computes its scheduling plan.
//! 2. Drives the ready frontier: every node whose predecessors have all
//!    completed is dispatched as soon as a concurrency permit is free —
//!    independent nodes run in parallel, bounded by
//!    `ExecutorConfig::max_parallel_nodes`.
//! 3. Resolves each node's `config` against the outputs collected so far
//!    via the `template` crate, then calls `nodes::wrap_execution`, which
//!    owns the `NodeExecution` open/close and logging contract.
//! 4. On node failure, dependents of that node never become ready (their
//!    predecessor never joins `completed`) — independent branches keep
//!    running. Once nothing is left running and at least one node has
//!    failed, the whole execution is marked `failed`.
//! 5. When every node has completed, the execution is marked `completed`
//!    with the most recently produced output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::models::ExecutionStatus;
use db::DbPool;
use nodes::{BlockRegistry, ExecutionContext, HandlerError, NodeSpec};

use crate::dag::{validate_dag, DagPlan};
use crate::{EngineError, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently-running nodes within one execution.
    pub max_parallel_nodes: usize,
    /// Wall-clock budget applied to a node whose `blockType` has no entry
    /// in `node_timeouts` (default 5 minutes).
    pub default_node_timeout: Duration,
    /// Per-`blockType` timeout overrides.
    pub node_timeouts: HashMap<String, Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 8,
            default_node_timeout: Duration::from_secs(300),
            node_timeouts: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    fn timeout_for(&self, block_type: &str) -> Duration {
        self.node_timeouts.get(block_type).copied().unwrap_or(self.default_node_timeout)
    }
}

// ---------------------------------------------------------------------------
// Result of a driven execution
// ---------------------------------------------------------------------------

/// The terminal outcome of driving a `WorkflowExecution`.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

type NodeOutcome = (String, Result<Value, HandlerError>);

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Orchestrator that drives workflow executions to completion.
///
/// One instance is typically shared (behind an `Arc`) across the API
/// process and every queue worker, since it is stateless beyond its
/// `DbPool`, `BlockRegistry`, `Services`, and `ExecutorConfig`.
#[derive(Clone)]
pub struct WorkflowExecutor {
    pool: DbPool,
    registry: BlockRegistry,
    services: nodes::services::Services,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        pool: DbPool,
        registry: BlockRegistry,
        services: nodes::services::Services,
        config: ExecutorConfig,
    ) -> Self {
        Self { pool, registry, services, config }
    }

    /// Start a brand-new execution of `workflow` and drive it to a
    /// terminal state.
    #[instrument(skip(self, input, cancellation), fields(workflow_id = %workflow.id))]
    pub async fn run(
        &self,
        workflow: &Workflow,
        input: Value,
        user_id: Option<String>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let plan = validate_dag(workflow)?;
        self.reject_unknown_block_types(workflow)?;

        let exec_row =
            db::repository::executions::create_execution(&self.pool, workflow.id, input.clone()).await?;
        let execution_id = exec_row.id;

        db::repository::executions::mark_running(&self.pool, execution_id).await?;
        self.log_execution_start(execution_id, workflow.id).await;

        self.drive(
            workflow,
            &plan,
            execution_id,
            input,
            user_id,
            HashSet::new(),
            Vec::new(),
            cancellation,
        )
        .await
    }

    /// Drive an execution whose `WorkflowExecution` row was already
    /// created elsewhere (the API handler that accepted the trigger).
    /// Used by queue workers pulling a job off `job_queue` — the row
    /// already exists in `pending`, so this only validates, marks it
    /// `running`, and drives the frontier.
    #[instrument(skip(self, input, cancellation), fields(workflow_id = %workflow.id, %execution_id))]
    pub async fn run_queued(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        input: Value,
        user_id: Option<String>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let plan = validate_dag(workflow)?;
        self.reject_unknown_block_types(workflow)?;

        db::repository::executions::mark_running(&self.pool, execution_id).await?;
        self.log_execution_start(execution_id, workflow.id).await;

        self.drive(
            workflow,
            &plan,
            execution_id,
            input,
            user_id,
            HashSet::new(),
            Vec::new(),
            cancellation,
        )
        .await
    }

    /// Resume a `paused` execution, reconstructing `previous_outputs` from
    /// the persisted `NodeExecution` rows — pausing/resuming must
    /// tolerate process restarts rather than rely on in-memory state.
    /// Re-enters `running` at the next ready frontier.
    #[instrument(skip(self, workflow_data, cancellation), fields(workflow_id = %workflow.id, %execution_id))]
    pub async fn resume(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        workflow_data: Value,
        user_id: Option<String>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let plan = validate_dag(workflow)?;

        let rows = db::repository::executions::list_node_executions(&self.pool, execution_id).await?;
        let mut completed = HashSet::new();
        let mut outputs = Vec::new();
        for row in rows {
            if row.status == "completed" {
                completed.insert(row.node_id.clone());
                if let Some(output) = row.output {
                    outputs.push((row.node_id, output));
                }
            }
        }

        db::repository::executions::mark_running(&self.pool, execution_id).await?;
        info!("resuming execution {} with {} nodes already completed", execution_id, completed.len());

        self.drive(workflow, &plan, execution_id, workflow_data, user_id, completed, outputs, cancellation)
            .await
    }

    /// Transition a running execution to `paused`. Resumption is handled
    /// by [`Self::resume`], which re-derives state from the database
    /// rather than an in-memory timer.
    pub async fn pause(&self, execution_id: Uuid) -> Result<(), EngineError> {
        db::repository::executions::finish_execution(&self.pool, execution_id, "paused", None, None).await?;
        Ok(())
    }

    /// Flip a running execution to `failed` with `error = "cancelled"`.
    /// In-flight handlers are expected to notice their `CancellationToken`
    /// and stop promptly; this call only updates the persisted record.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        db::repository::executions::finish_execution(
            &self.pool,
            execution_id,
            "failed",
            None,
            Some("cancelled".to_string()),
        )
        .await?;
        Ok(())
    }

    fn reject_unknown_block_types(&self, workflow: &Workflow) -> Result<(), EngineError> {
        for node in &workflow.nodes {
            if self.registry.get(&node.block_type).is_none() {
                return Err(EngineError::UnknownBlockType(node.block_type.clone()));
            }
        }
        Ok(())
    }

    async fn log_execution_start(&self, execution_id: Uuid, workflow_id: Uuid) {
        let _ = db::repository::logs::append_log(
            &self.pool,
            execution_id,
            None,
            "info",
            "ExecutionStart",
            Some(serde_json::json!({ "workflowId": workflow_id })),
        )
        .await;
    }

    /// The ready-frontier scheduling loop shared by `run` and `resume`.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        workflow: &Workflow,
        plan: &DagPlan,
        execution_id: Uuid,
        workflow_data: Value,
        user_id: Option<String>,
        initial_completed: HashSet<String>,
        initial_outputs: Vec<(String, Value)>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let node_map: HashMap<&str, _> = workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let total_nodes = workflow.nodes.len();

        let dispatched: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(initial_completed.clone()));
        let completed: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(initial_completed));
        let mut last_output: Option<Value> = initial_outputs.last().map(|(_, v)| v.clone());
        let outputs: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(initial_outputs));

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_nodes.max(1)));
        let mut in_flight: JoinSet<NodeOutcome> = JoinSet::new();
        let mut first_error: Option<(String, String)> = None;

        loop {
            let ready: Vec<String> = if cancellation.is_cancelled() {
                Vec::new()
            } else {
                let completed_guard = completed.lock().await;
                let dispatched_guard = dispatched.lock().await;
                plan.order
                    .iter()
                    .filter(|id| {
                        !dispatched_guard.contains(*id)
                            && plan.predecessors[*id].iter().all(|p| completed_guard.contains(p))
                    })
                    .cloned()
                    .collect()
            };

            for node_id in ready {
                dispatched.lock().await.insert(node_id.clone());

                let node_def = node_map[node_id.as_str()].clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let pool = self.pool.clone();
                let registry = self.registry.clone();
                let services = self.services.clone();
                let outputs_snapshot = outputs.lock().await.clone();
                let timeout = self.config.timeout_for(&node_def.block_type);
                let node_cancellation = cancellation.clone();
                let node_user_id = user_id.clone();
                let node_workflow_data = workflow_data.clone();
                let workflow_id = workflow.id;

                in_flight.spawn(async move {
                    let _permit = permit;

                    let tmpl_ctx = template::Context {
                        previous_outputs: outputs_snapshot.clone(),
                        ambient: serde_json::json!({
                            "executionId": execution_id,
                            "workflowId": workflow_id,
                            "nodeId": node_id,
                        }),
                    };

                    let resolved_config =
                        match template::resolve_config(&node_def.config, &node_workflow_data, &tmpl_ctx) {
                            Ok(c) => c,
                            Err(e) => return (node_id, Err(HandlerError::from(e))),
                        };

                    let spec = NodeSpec {
                        id: node_id.clone(),
                        block_type: node_def.block_type.clone(),
                        config: resolved_config,
                    };

                    let Some(handler) = registry.get(&node_def.block_type) else {
                        return (
                            node_id,
                            Err(HandlerError::Internal(format!("no handler for '{}'", node_def.block_type))),
                        );
                    };

                    let ctx = ExecutionContext {
                        workflow_id,
                        execution_id,
                        user_id: node_user_id,
                        workflow_data: node_workflow_data,
                        previous_outputs: outputs_snapshot,
                        services,
                        cancellation: node_cancellation,
                    };

                    let result = nodes::wrap_execution(&pool, handler.as_ref(), &spec, &ctx, timeout).await;
                    (node_id, result)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            match in_flight.join_next().await {
                Some(Ok((node_id, Ok(output)))) => {
                    completed.lock().await.insert(node_id.clone());
                    outputs.lock().await.push((node_id, output.clone()));
                    last_output = Some(output);
                }
                Some(Ok((node_id, Err(err)))) => {
                    warn!("node '{}' failed: {}", node_id, err);
                    if first_error.is_none() {
                        first_error = Some((node_id, err.to_string()));
                    }
                }
                Some(Err(join_err)) => {
                    error!("node task panicked: {join_err}");
                    if first_error.is_none() {
                        first_error = Some(("*".to_string(), format!("node task panicked: {join_err}")));
                    }
                }
                None => break,
            }
        }

        let completed_count = completed.lock().await.len();

        let result = if cancellation.is_cancelled() {
            self.finish(execution_id, ExecutionStatus::Failed, None, Some("cancelled".to_string())).await?
        } else if let Some((node_id, message)) = first_error {
            self.finish(
                execution_id,
                ExecutionStatus::Failed,
                None,
                Some(format!("node '{node_id}' failed: {message}")),
            )
            .await?
        } else if completed_count == total_nodes {
            self.finish(execution_id, ExecutionStatus::Completed, last_output, None).await?
        } else {
            // A valid DAG always has at least one root, so every node
            // should eventually become ready; reaching this branch means
            // scheduling stalled for a reason not captured above.
            self.finish(
                execution_id,
                ExecutionStatus::Failed,
                None,
                Some("scheduling stalled before all nodes completed".to_string()),
            )
            .await?
        };

        Ok(result)
    }

    async fn finish(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<String>,
    ) -> Result<ExecutionResult, EngineError> {
        db::repository::executions::finish_execution(
            &self.pool,
            execution_id,
            &status.to_string(),
            output.clone(),
            error.clone(),
        )
        .await?;

        Ok(ExecutionResult { execution_id, status, output, error })
    }
}
