//! `session` crate — Session-Key Crypto, Session-Key Authority, and
//! Session Monitor.
//!
//! A session key delegates a bounded slice of on-chain capability to the
//! platform's worker: which operations it may perform, per-transaction
//! and daily spending caps, and an allow-list of target addresses. This
//! crate is the only place that ever decrypts a session private key, the
//! only place that decides whether an attempted use is within policy,
//! and the only place that watches active keys for anomalous spending.

pub mod authority;
pub mod crypto;
pub mod error;
pub mod monitor;

pub use authority::{
    CreateSessionKeyRequest, CreatedSessionKey, DelegationMessage, PermissionRequest, PermissionSummary,
    SessionKeyAuthority, ValidationOutcome,
};
pub use error::SessionError;
pub use monitor::{Alert, MonitorConfig, MonitorMetrics, SessionMonitor, SweepReport};
