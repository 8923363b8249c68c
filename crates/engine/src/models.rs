//! Core domain models for the workflow graph.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory. They serialise to/from the JSONB `definition` column of
//! the `workflows` table (`db::models::WorkflowRow`). Execution-state
//! entities (`WorkflowExecution`, `NodeExecution`) live at the
//! persistence boundary in `db::models` — the engine treats the
//! database as the source of truth for a run already in flight rather
//! than keeping a second in-memory copy of status rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Triggered by an incoming HTTP request to `/webhook/{path}`.
    Webhook {
        /// URL path segment that identifies this workflow.
        path: String,
    },
    /// Triggered manually via the REST API.
    Manual,
    /// Triggered on a cron schedule.
    ///
    /// No scheduler consumes this variant yet — see DESIGN.md,
    /// `getDueRecurringOperations`.
    Cron {
        /// Standard cron expression (5 fields).
        expression: String,
    },
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single vertex of the workflow graph — a "block" in spec terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Maps to a registered `BlockHandler` implementation.
    pub block_type: String,
    /// Opaque configuration, possibly containing template expressions.
    /// Walked and resolved by `template::resolve_config` before dispatch.
    pub config: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Convenience constructor for a plain edge with no handle
    /// disambiguation.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition: an immutable DAG once executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub trigger: Trigger,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        nodes: Vec<NodeDefinition>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger,
            nodes,
            edges,
            created_at: Utc::now(),
        }
    }
}
