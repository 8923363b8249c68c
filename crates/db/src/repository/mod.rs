//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` (or an open transaction) and returns
//! a `Result<T, DbError>`. No business logic, no domain types — pure SQL.

pub mod agent_snapshots;
pub mod executions;
pub mod jobs;
pub mod logs;
pub mod session_events;
pub mod session_keys;
pub mod session_transactions;
pub mod workflows;
