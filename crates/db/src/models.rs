//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types that know how to validate and execute live in the
//! `engine` and `session` crates; this crate only shuttles rows in and
//! out of Postgres.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (nodes, edges, trigger, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// node_executions
// ---------------------------------------------------------------------------

/// Possible statuses for a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for NodeExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A persisted node execution row. One row exists per `(execution_id,
/// node_id)` pair, created before the handler runs and closed on
/// success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeExecutionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub block_type: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

/// Append-only log line attached to a workflow execution, optionally
/// scoped to a single node.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionLogRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: Option<String>,
    pub level: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// job_queue
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLettered,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// A job row fetched from the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// session_keys
// ---------------------------------------------------------------------------

/// Possible statuses for a delegated session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKeyStatus {
    Active,
    Paused,
    Revoked,
    Expired,
}

impl std::fmt::Display for SessionKeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Revoked => write!(f, "revoked"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for SessionKeyStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown session key status: {other}")),
        }
    }
}

/// A persisted session key row.
///
/// `encrypted_private_key` and `encrypted_session_params` are
/// ciphertext blobs; decryption happens in the `session` crate, never
/// here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionKeyRow {
    pub id: Uuid,
    pub user_id: String,
    pub chain_id: i64,
    pub session_address: String,
    pub encrypted_private_key: String,
    pub owner_address: String,
    pub parent_address: String,
    pub status: String,
    pub security_level: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub total_used: Decimal,
    pub daily_used: Decimal,
    pub daily_reset_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub encrypted_session_params: Option<String>,
}

// ---------------------------------------------------------------------------
// session_permissions
// ---------------------------------------------------------------------------

/// A single permission scoped to one operation on a session key.
///
/// `UNIQUE(session_key_id, operation)` is enforced at the schema level:
/// two permissions for the same operation on the same key are rejected
/// by the persistence port with `DbError::UniqueViolation`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PermissionRow {
    pub id: Uuid,
    pub session_key_id: Uuid,
    pub operation: String,
    pub max_amount_per_tx: Decimal,
    pub max_daily_amount: Decimal,
    /// Empty means "no allow-list restriction".
    pub allowed_contracts: Vec<String>,
    pub require_confirmation: bool,
    pub emergency_stop: bool,
}

// ---------------------------------------------------------------------------
// session_events
// ---------------------------------------------------------------------------

/// Append-only audit trail for a session key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionEventRow {
    pub id: Uuid,
    pub session_key_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// session_transactions
// ---------------------------------------------------------------------------

/// Recorded after a session key successfully signs and submits an
/// on-chain action.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionTransactionRow {
    pub id: Uuid,
    pub session_key_id: Uuid,
    pub amount: Decimal,
    pub to_address: String,
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// agent_snapshots
// ---------------------------------------------------------------------------

/// A persisted AI-agent reasoning trace, kept so a later run can replay or
/// diff against it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentSnapshotRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub config: serde_json::Value,
    pub steps: serde_json::Value,
    pub tool_calls: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
