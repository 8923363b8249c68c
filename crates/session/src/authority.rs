//! The Session-Key Authority: CRUD over delegated session keys plus
//! the pre-transaction `validate` check every blockchain-capable handler
//! must pass before it signs anything on chain.
//!
//! Validate-then-reserve race (resolved **strict** per
//! DESIGN.md): `validate` takes a row-level lock for the duration of its
//! own check, but the lock cannot span the caller's on-chain round trip
//! between `validate` and `record_usage` without serializing every send
//! through one session key. Instead `record_usage` re-derives the daily
//! window and re-checks the cap itself, inside its own locked
//! transaction, and rejects with `PolicyDenied` if a concurrent usage
//! already exhausted the cap. A burst that each individually passed
//! `validate` can still have exactly one winner at `record_usage` time.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use tracing::{instrument, warn};
use uuid::Uuid;

use db::repository::session_keys::{self, NewPermission};
use db::{DbError, DbPool};

use crate::crypto;
use crate::error::SessionError;

const DAILY_WINDOW: ChronoDuration = ChronoDuration::hours(24);
const MAX_TX_RETRIES: u32 = 3;

/// One permission supplied when creating a session key.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub operation: String,
    pub max_amount_per_tx: Decimal,
    pub max_daily_amount: Decimal,
    pub allowed_contracts: Vec<String>,
    pub require_confirmation: bool,
    pub emergency_stop: bool,
}

/// Request to delegate a new session key.
#[derive(Debug, Clone)]
pub struct CreateSessionKeyRequest {
    pub user_id: String,
    pub chain_id: i64,
    pub owner_address: String,
    pub parent_address: String,
    pub security_level: String,
    pub valid_until: DateTime<Utc>,
    pub permissions: Vec<PermissionRequest>,
    pub purpose: Option<String>,
}

/// Delegation message returned to the caller for optional countersigning,
/// using stable, interoperable field names.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationMessage {
    pub smart_wallet_address: String,
    pub session_key_address: String,
    pub delegated_by: String,
    pub chain_id: i64,
    pub security_level: String,
    pub valid_until: DateTime<Utc>,
    pub nonce: String,
    pub permissions: Vec<PermissionSummary>,
    pub timestamp: DateTime<Utc>,
    pub purpose: Option<String>,
    pub parent_signature: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSummary {
    pub operation: String,
    pub max_amount_per_tx: Decimal,
    pub max_daily_amount: Decimal,
}

/// Result of `create`.
#[derive(Debug, Clone)]
pub struct CreatedSessionKey {
    pub session_key_id: Uuid,
    pub session_address: String,
    pub delegation_message: DelegationMessage,
}

/// Outcome of a pre-transaction validation check.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub remaining_daily_amount: Option<Decimal>,
}

/// CRUD, validation, and usage-metering surface of the Session-Key
/// Authority. Stateless beyond its `DbPool` — share one instance behind
/// an `Arc` across the API process and every worker.
#[derive(Clone)]
pub struct SessionKeyAuthority {
    pool: DbPool,
}

impl SessionKeyAuthority {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Generate a key pair, encrypt the private key with `user_signature`
    /// as the symmetric secret, and persist the key, its permissions, and
    /// a `created` event in one transaction.
    #[instrument(skip(self, request, user_signature), fields(user_id = %request.user_id))]
    pub async fn create(
        &self,
        request: CreateSessionKeyRequest,
        user_signature: &str,
    ) -> Result<CreatedSessionKey, SessionError> {
        let keypair = crypto::generate_keypair()?;
        let encrypted_private_key = crypto::encrypt_private_key(&keypair.private_key, user_signature)?;
        let nonce = crypto::generate_nonce();
        let now = Utc::now();

        let permission_rows: Vec<NewPermission> = request
            .permissions
            .iter()
            .map(|p| NewPermission {
                operation: p.operation.clone(),
                max_amount_per_tx: p.max_amount_per_tx,
                max_daily_amount: p.max_daily_amount,
                allowed_contracts: p.allowed_contracts.clone(),
                require_confirmation: p.require_confirmation,
                emergency_stop: p.emergency_stop,
            })
            .collect();

        let (key_row, _permissions) = session_keys::create_session_key(
            &self.pool,
            &request.user_id,
            request.chain_id,
            &keypair.address,
            &encrypted_private_key,
            &request.owner_address,
            &request.parent_address,
            &request.security_level,
            request.valid_until,
            None,
            permission_rows,
        )
        .await?;

        let permission_summaries = request
            .permissions
            .iter()
            .map(|p| PermissionSummary {
                operation: p.operation.clone(),
                max_amount_per_tx: p.max_amount_per_tx,
                max_daily_amount: p.max_daily_amount,
            })
            .collect();

        let delegation_message = DelegationMessage {
            smart_wallet_address: request.owner_address,
            session_key_address: keypair.address.clone(),
            delegated_by: request.parent_address,
            chain_id: request.chain_id,
            security_level: request.security_level,
            valid_until: request.valid_until,
            nonce,
            permissions: permission_summaries,
            timestamp: now,
            purpose: request.purpose,
            parent_signature: None,
        };

        Ok(CreatedSessionKey {
            session_key_id: key_row.id,
            session_address: keypair.address,
            delegation_message,
        })
    }

    /// Fetch a session key by id. Does not decrypt the private key.
    pub async fn get(&self, id: Uuid) -> Result<db::models::SessionKeyRow, SessionError> {
        session_keys::get_session_key(&self.pool, id).await.map_err(Into::into)
    }

    /// List session keys owned by a user, optionally filtered by status.
    pub async fn list_by_user(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<db::models::SessionKeyRow>, SessionError> {
        session_keys::list_by_user(&self.pool, user_id, status).await.map_err(Into::into)
    }

    /// The eight-step pre-transaction check. Every failure is
    /// accumulated into `errors` rather than short-circuiting, so a caller
    /// sees every reason a use was denied. Always writes a `SessionEvent`:
    /// `used`/`info` on success, `security_alert`/`warning` on denial.
    #[instrument(skip(self), fields(%session_key_id, operation, %amount))]
    pub async fn validate(
        &self,
        session_key_id: Uuid,
        operation: &str,
        amount: Decimal,
        to_address: &str,
    ) -> Result<ValidationOutcome, SessionError> {
        let mut errors = Vec::new();
        let now = Utc::now();

        let key_row = match session_keys::get_session_key(&self.pool, session_key_id).await {
            Ok(row) => row,
            Err(DbError::NotFound) => {
                return Ok(ValidationOutcome {
                    is_valid: false,
                    errors: vec!["session key not found".to_string()],
                    remaining_daily_amount: None,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if key_row.status != "active" {
            errors.push(format!("session key is not active (status = {})", key_row.status));
        }

        if now > key_row.valid_until {
            errors.push("session key has expired".to_string());
            let _ = session_keys::set_status_with_event(
                &self.pool,
                session_key_id,
                "expired",
                None,
                "expired",
                serde_json::json!({ "reason": "valid_until lapsed during validate" }),
                "info",
            )
            .await;
        }

        let permissions = session_keys::list_permissions(&self.pool, session_key_id).await?;
        let permission = permissions.iter().find(|p| p.operation == operation);

        let mut remaining_daily_amount = None;

        match permission {
            None => {
                errors.push(format!("no permission granted for operation '{operation}'"));
            }
            Some(permission) => {
                if permission.emergency_stop {
                    errors.push("emergency stop is active for this operation".to_string());
                }

                if amount > permission.max_amount_per_tx {
                    errors.push(format!(
                        "amount {amount} exceeds per-transaction cap {}",
                        permission.max_amount_per_tx
                    ));
                }

                let daily_used = rolling_daily_used(key_row.daily_used, key_row.daily_reset_at, now);
                if daily_used + amount > permission.max_daily_amount {
                    errors.push(format!(
                        "amount {amount} would exceed daily cap {} (used {daily_used})",
                        permission.max_daily_amount
                    ));
                } else {
                    remaining_daily_amount = Some(remaining_after(permission.max_daily_amount, daily_used));
                }

                if !permission.allowed_contracts.is_empty()
                    && !permission.allowed_contracts.iter().any(|c| c.eq_ignore_ascii_case(to_address))
                {
                    errors.push(format!("'{to_address}' is not in the allowed-contracts list"));
                }
            }
        }

        let is_valid = errors.is_empty();

        let event_data = serde_json::json!({
            "operation": operation,
            "amount": amount.to_string(),
            "toAddress": to_address,
            "errors": errors,
        });

        if let Err(e) = session_keys::insert_event(
            &self.pool,
            session_key_id,
            if is_valid { "used" } else { "security_alert" },
            event_data,
            if is_valid { "info" } else { "warning" },
        )
        .await
        {
            warn!("failed to write session event for validate({session_key_id}): {e}");
        }

        Ok(ValidationOutcome { is_valid, errors, remaining_daily_amount })
    }

    /// Apply a successful use: reset the daily window if 24h have passed,
    /// then atomically increment `totalUsed`/`dailyUsed` and write a
    /// `used` event, all inside one transaction holding a row lock on the
    /// session key. Re-validates the daily cap before committing (see
    /// module docs on the validate/record_usage race).
    #[instrument(skip(self), fields(%session_key_id, %amount))]
    pub async fn record_usage(
        &self,
        session_key_id: Uuid,
        amount: Decimal,
        to_address: &str,
        tx_hash: Option<&str>,
    ) -> Result<(), SessionError> {
        db::retry::with_backoff(MAX_TX_RETRIES, std::time::Duration::from_millis(20), || {
            self.record_usage_once(session_key_id, amount, to_address, tx_hash)
        })
        .await
        .map_err(Into::into)
    }

    async fn record_usage_once(
        &self,
        session_key_id: Uuid,
        amount: Decimal,
        to_address: &str,
        tx_hash: Option<&str>,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from_sqlx)?;
        let now = Utc::now();

        let key_row = session_keys::get_session_key_for_update(&mut tx, session_key_id).await?;
        let permissions = session_keys::list_permissions_tx(&mut tx, session_key_id).await?;

        let (new_daily_used, new_daily_reset_at) =
            rolling_window(key_row.daily_used, key_row.daily_reset_at, now, amount);

        if let Some(widest_cap) = permissions.iter().map(|p| p.max_daily_amount).max() {
            if new_daily_used > widest_cap {
                tx.rollback().await.map_err(DbError::from_sqlx)?;
                return Err(DbError::SerializationConflict);
            }
        }

        let new_total_used = key_row.total_used + amount;

        session_keys::apply_usage_tx(&mut tx, session_key_id, new_total_used, new_daily_used, new_daily_reset_at, now)
            .await?;

        session_keys::insert_event_tx(
            &mut tx,
            session_key_id,
            "used",
            serde_json::json!({ "amount": amount.to_string(), "transactionHash": tx_hash }),
            "info",
        )
        .await?;

        db::repository::session_transactions::record_transaction_tx(
            &mut tx,
            session_key_id,
            amount,
            to_address,
            tx_hash,
        )
        .await?;

        tx.commit().await.map_err(DbError::from_sqlx)?;
        Ok(())
    }

    /// Transition a session key to `revoked`.
    pub async fn revoke(&self, id: Uuid, reason: Option<&str>) -> Result<(), SessionError> {
        session_keys::set_status_with_event(
            &self.pool,
            id,
            "revoked",
            Some(Utc::now()),
            "revoked",
            serde_json::json!({ "reason": reason }),
            "info",
        )
        .await
        .map_err(Into::into)
    }

    /// Expire every `active` session key whose `validUntil` has lapsed.
    /// Returns the count transitioned.
    pub async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let lapsed = session_keys::list_lapsed_active(&self.pool, now).await?;

        for row in &lapsed {
            if let Err(e) = session_keys::set_status_with_event(
                &self.pool,
                row.id,
                "expired",
                None,
                "expired",
                serde_json::json!({ "reason": "valid_until lapsed" }),
                "info",
            )
            .await
            {
                warn!("failed to expire session key {}: {e}", row.id);
            }
        }

        Ok(lapsed.len())
    }
}

/// How much of the daily cap is left after the current `dailyUsed`,
/// not counting the amount of the transaction currently being validated.
fn remaining_after(max_daily_amount: Decimal, daily_used: Decimal) -> Decimal {
    max_daily_amount - daily_used
}

/// Recompute `dailyUsed` as of `now` without mutating anything, for use
/// in read-only checks (`validate`).
fn rolling_daily_used(daily_used: Decimal, daily_reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    if now - daily_reset_at >= DAILY_WINDOW {
        Decimal::ZERO
    } else {
        daily_used
    }
}

/// Compute the post-usage `(dailyUsed, dailyResetAt)` pair, resetting the
/// window only when a full 24h has elapsed since the last reset.
fn rolling_window(
    daily_used: Decimal,
    daily_reset_at: DateTime<Utc>,
    now: DateTime<Utc>,
    amount: Decimal,
) -> (Decimal, DateTime<Utc>) {
    if now - daily_reset_at >= DAILY_WINDOW {
        (amount, now)
    } else {
        (daily_used + amount, daily_reset_at)
    }
}

/// Adapts [`SessionKeyAuthority`] to the narrow port `nodes::services`
/// defines for block handlers, so `BLOCKCHAIN_SEND` and the AI-agent's
/// on-chain tool never depend on this crate's full surface — only on the
/// `validate`/`record_usage` pair they actually call.
#[async_trait]
impl nodes::services::SessionAuthority for SessionKeyAuthority {
    async fn validate(
        &self,
        session_key_id: Uuid,
        operation: &str,
        amount: Decimal,
        to_address: &str,
    ) -> Result<nodes::services::ValidationOutcome, nodes::HandlerError> {
        let outcome = SessionKeyAuthority::validate(self, session_key_id, operation, amount, to_address)
            .await
            .map_err(handler_error)?;

        Ok(nodes::services::ValidationOutcome {
            is_valid: outcome.is_valid,
            errors: outcome.errors,
            remaining_daily_amount: outcome.remaining_daily_amount,
        })
    }

    async fn record_usage(
        &self,
        session_key_id: Uuid,
        amount: Decimal,
        to_address: &str,
        tx_hash: Option<&str>,
    ) -> Result<(), nodes::HandlerError> {
        SessionKeyAuthority::record_usage(self, session_key_id, amount, to_address, tx_hash)
            .await
            .map_err(handler_error)
    }
}

fn handler_error(err: SessionError) -> nodes::HandlerError {
    match err {
        SessionError::NotFound => nodes::HandlerError::NotFound("session key not found".into()),
        SessionError::PolicyDenied(msg) => nodes::HandlerError::PolicyDenied(msg),
        SessionError::Unauthorized(msg) => nodes::HandlerError::Unauthorized(msg),
        SessionError::Crypto(msg) => nodes::HandlerError::Internal(format!("session crypto error: {msg}")),
        SessionError::Database(e) => nodes::HandlerError::Internal(format!("session database error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_after_does_not_subtract_the_pending_amount() {
        // maxDailyAmount = 100, dailyUsed = 20, amount = 5 → remaining = 80,
        // not 75: the pending transaction hasn't been recorded yet.
        let max_daily_amount = Decimal::new(10000, 2);
        let daily_used = Decimal::new(2000, 2);
        assert_eq!(remaining_after(max_daily_amount, daily_used), Decimal::new(8000, 2));
    }

    #[test]
    fn rolling_daily_used_resets_after_24h() {
        let reset_at = Utc::now() - ChronoDuration::hours(25);
        let used = rolling_daily_used(Decimal::new(9000, 2), reset_at, Utc::now());
        assert_eq!(used, Decimal::ZERO);
    }

    #[test]
    fn rolling_daily_used_holds_within_window() {
        let reset_at = Utc::now() - ChronoDuration::hours(2);
        let used = rolling_daily_used(Decimal::new(9000, 2), reset_at, Utc::now());
        assert_eq!(used, Decimal::new(9000, 2));
    }

    #[test]
    fn rolling_window_resets_and_seeds_with_amount() {
        let reset_at = Utc::now() - ChronoDuration::hours(25);
        let now = Utc::now();
        let (used, reset) = rolling_window(Decimal::new(9000, 2), reset_at, now, Decimal::new(300, 2));
        assert_eq!(used, Decimal::new(300, 2));
        assert_eq!(reset, now);
    }

    #[test]
    fn rolling_window_accumulates_within_window() {
        let reset_at = Utc::now() - ChronoDuration::hours(1);
        let (used, reset) = rolling_window(Decimal::new(9000, 2), reset_at, Utc::now(), Decimal::new(300, 2));
        assert_eq!(used, Decimal::new(9300, 2));
        assert_eq!(reset, reset_at);
    }
}
