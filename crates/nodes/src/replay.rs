//! Snapshot/replay support for the `AI_AGENT` handler.
//!
//! A snapshot is the full reasoning trace of one agent run: its resolved
//! config, the step-by-step `{think, tool-call, observe}` log, every tool
//! call, and the final result. [`ReplayStore`] is the persistence seam —
//! an in-memory implementation for tests and a `db`-backed one for
//! production, so the snapshot mechanism itself is never a stub even
//! though persisting it is optional per node.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::HandlerError;

/// One recorded agent run, keyed by the execution and node that produced it.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub config: Value,
    pub steps: Value,
    pub tool_calls: Value,
    pub result: Value,
}

/// How a replay re-runs a previously snapshotted agent trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Re-run deterministically, reusing the original tool results instead
    /// of calling tools again.
    Exact,
    /// Re-plan from scratch, but seed the model with the original trace as
    /// context.
    Adaptive,
    /// Re-run the reasoning loop without performing any tool side effects.
    DryRun,
}

impl std::str::FromStr for ReplayMode {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ReplayMode::Exact),
            "adaptive" => Ok(ReplayMode::Adaptive),
            "dry-run" | "dry_run" => Ok(ReplayMode::DryRun),
            other => Err(HandlerError::ConfigInvalid(format!("unknown replay mode '{other}'"))),
        }
    }
}

/// Persists and retrieves agent snapshots. Kept as a trait so the
/// mechanism is always present while the concrete store (in-memory vs.
/// database-backed) is a deployment choice.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    async fn save(&self, snapshot: AgentSnapshot) -> Result<Uuid, HandlerError>;
    async fn get(&self, id: Uuid) -> Result<Option<AgentSnapshot>, HandlerError>;
    async fn latest_for_node(
        &self,
        execution_id: Uuid,
        node_id: &str,
    ) -> Result<Option<AgentSnapshot>, HandlerError>;
}

/// A process-local store, useful for tests and for single-process demo
/// deployments that don't need snapshots to survive a restart.
#[derive(Default)]
pub struct InMemoryReplayStore {
    snapshots: Mutex<HashMap<Uuid, AgentSnapshot>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn save(&self, snapshot: AgentSnapshot) -> Result<Uuid, HandlerError> {
        let id = snapshot.id;
        self.snapshots.lock().unwrap().insert(id, snapshot);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AgentSnapshot>, HandlerError> {
        Ok(self.snapshots.lock().unwrap().get(&id).cloned())
    }

    async fn latest_for_node(
        &self,
        execution_id: Uuid,
        node_id: &str,
    ) -> Result<Option<AgentSnapshot>, HandlerError> {
        let guard = self.snapshots.lock().unwrap();
        Ok(guard
            .values()
            .filter(|s| s.execution_id == execution_id && s.node_id == node_id)
            .max_by_key(|s| s.id)
            .cloned())
    }
}

/// Durable store backed by the `agent_snapshots` table.
pub struct DbReplayStore {
    pool: db::DbPool,
}

impl DbReplayStore {
    pub fn new(pool: db::DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReplayStore for DbReplayStore {
    async fn save(&self, snapshot: AgentSnapshot) -> Result<Uuid, HandlerError> {
        db::repository::agent_snapshots::insert(
            &self.pool,
            snapshot.execution_id,
            &snapshot.node_id,
            snapshot.config,
            snapshot.steps,
            snapshot.tool_calls,
            snapshot.result,
        )
        .await
        .map_err(|e| HandlerError::Internal(e.to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<AgentSnapshot>, HandlerError> {
        let row = db::repository::agent_snapshots::get(&self.pool, id)
            .await
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        Ok(row.map(|r| AgentSnapshot {
            id: r.id,
            execution_id: r.execution_id,
            node_id: r.node_id,
            config: r.config,
            steps: r.steps,
            tool_calls: r.tool_calls,
            result: r.result,
        }))
    }

    async fn latest_for_node(
        &self,
        execution_id: Uuid,
        node_id: &str,
    ) -> Result<Option<AgentSnapshot>, HandlerError> {
        let row = db::repository::agent_snapshots::latest_for_node(&self.pool, execution_id, node_id)
            .await
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        Ok(row.map(|r| AgentSnapshot {
            id: r.id,
            execution_id: r.execution_id,
            node_id: r.node_id,
            config: r.config,
            steps: r.steps,
            tool_calls: r.tool_calls,
            result: r.result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(execution_id: Uuid, node_id: &str) -> AgentSnapshot {
        AgentSnapshot {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.to_string(),
            config: json!({"prompt": "hi"}),
            steps: json!([]),
            tool_calls: json!([]),
            result: json!({"text": "hi back"}),
        }
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_and_finds_latest() {
        let store = InMemoryReplayStore::new();
        let execution_id = Uuid::new_v4();

        let first = sample(execution_id, "agent-1");
        let first_id = store.save(first.clone()).await.unwrap();
        assert_eq!(store.get(first_id).await.unwrap().unwrap().node_id, "agent-1");

        let latest = store.latest_for_node(execution_id, "agent-1").await.unwrap();
        assert!(latest.is_some());

        let other_node = store.latest_for_node(execution_id, "agent-2").await.unwrap();
        assert!(other_node.is_none());
    }

    #[test]
    fn replay_mode_parses_known_strings() {
        assert_eq!("exact".parse::<ReplayMode>().unwrap(), ReplayMode::Exact);
        assert_eq!("adaptive".parse::<ReplayMode>().unwrap(), ReplayMode::Adaptive);
        assert_eq!("dry-run".parse::<ReplayMode>().unwrap(), ReplayMode::DryRun);
        assert!("bogus".parse::<ReplayMode>().is_err());
    }
}
