//! Session-key repository functions.
//!
//! The transactional composites here are the persistence half of the
//! Session-Key Authority's contract (`session::Authority`): every
//! operation that must be atomic (create key + permissions + event,
//! update usage + event, transition status + event) opens exactly one
//! `sqlx::Transaction` and commits it before returning.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{PermissionRow, SessionEventRow, SessionKeyRow},
    DbError,
};

/// Input for a single permission when creating a session key.
pub struct NewPermission {
    pub operation: String,
    pub max_amount_per_tx: Decimal,
    pub max_daily_amount: Decimal,
    pub allowed_contracts: Vec<String>,
    pub require_confirmation: bool,
    pub emergency_stop: bool,
}

/// Create a session key, its permissions, and a `created` event in one
/// transaction. Fails with `DbError::UniqueViolation` if two supplied
/// permissions share an `operation`.
#[allow(clippy::too_many_arguments)]
pub async fn create_session_key(
    pool: &PgPool,
    user_id: &str,
    chain_id: i64,
    session_address: &str,
    encrypted_private_key: &str,
    owner_address: &str,
    parent_address: &str,
    security_level: &str,
    valid_until: DateTime<Utc>,
    encrypted_session_params: Option<&str>,
    permissions: Vec<NewPermission>,
) -> Result<(SessionKeyRow, Vec<PermissionRow>), DbError> {
    let mut tx = pool.begin().await.map_err(DbError::from_sqlx)?;

    let id = Uuid::new_v4();
    let now = Utc::now();

    let key_row = sqlx::query_as::<_, SessionKeyRow>(
        r#"
        INSERT INTO session_keys
            (id, user_id, chain_id, session_address, encrypted_private_key,
             owner_address, parent_address, status, security_level, valid_until,
             created_at, total_used, daily_used, daily_reset_at, encrypted_session_params)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9, $10, 0, 0, $10, $11)
        RETURNING id, user_id, chain_id, session_address, encrypted_private_key,
                  owner_address, parent_address, status, security_level, valid_until,
                  created_at, revoked_at, total_used, daily_used, daily_reset_at,
                  last_used_at, encrypted_session_params
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(chain_id)
    .bind(session_address)
    .bind(encrypted_private_key)
    .bind(owner_address)
    .bind(parent_address)
    .bind(security_level)
    .bind(valid_until)
    .bind(now)
    .bind(encrypted_session_params)
    .fetch_one(&mut *tx)
    .await
    .map_err(DbError::from_sqlx)?;

    let mut permission_rows = Vec::with_capacity(permissions.len());
    for perm in permissions {
        let perm_id = Uuid::new_v4();
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            INSERT INTO session_permissions
                (id, session_key_id, operation, max_amount_per_tx, max_daily_amount,
                 allowed_contracts, require_confirmation, emergency_stop)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, session_key_id, operation, max_amount_per_tx, max_daily_amount,
                      allowed_contracts, require_confirmation, emergency_stop
            "#,
        )
        .bind(perm_id)
        .bind(id)
        .bind(&perm.operation)
        .bind(perm.max_amount_per_tx)
        .bind(perm.max_daily_amount)
        .bind(&perm.allowed_contracts)
        .bind(perm.require_confirmation)
        .bind(perm.emergency_stop)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from_sqlx)?;

        permission_rows.push(row);
    }

    insert_event_tx(
        &mut tx,
        id,
        "created",
        serde_json::json!({ "user_id": user_id, "chain_id": chain_id }),
        "info",
    )
    .await?;

    tx.commit().await.map_err(DbError::from_sqlx)?;

    Ok((key_row, permission_rows))
}

/// Fetch a session key by id.
pub async fn get_session_key(pool: &PgPool, id: Uuid) -> Result<SessionKeyRow, DbError> {
    sqlx::query_as::<_, SessionKeyRow>(
        r#"
        SELECT id, user_id, chain_id, session_address, encrypted_private_key,
               owner_address, parent_address, status, security_level, valid_until,
               created_at, revoked_at, total_used, daily_used, daily_reset_at,
               last_used_at, encrypted_session_params
        FROM session_keys WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_sqlx)?
    .ok_or(DbError::NotFound)
}

/// Fetch a session key for update, holding a row-level lock for the
/// duration of the caller's transaction. Used by `validate` and
/// `record_usage` to serialize against each other and the monitor sweep.
pub async fn get_session_key_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<SessionKeyRow, DbError> {
    sqlx::query_as::<_, SessionKeyRow>(
        r#"
        SELECT id, user_id, chain_id, session_address, encrypted_private_key,
               owner_address, parent_address, status, security_level, valid_until,
               created_at, revoked_at, total_used, daily_used, daily_reset_at,
               last_used_at, encrypted_session_params
        FROM session_keys WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(DbError::from_sqlx)?
    .ok_or(DbError::NotFound)
}

/// List permissions attached to a session key.
pub async fn list_permissions(pool: &PgPool, session_key_id: Uuid) -> Result<Vec<PermissionRow>, DbError> {
    sqlx::query_as::<_, PermissionRow>(
        r#"
        SELECT id, session_key_id, operation, max_amount_per_tx, max_daily_amount,
               allowed_contracts, require_confirmation, emergency_stop
        FROM session_permissions WHERE session_key_id = $1
        "#,
    )
    .bind(session_key_id)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// List session keys owned by a user, via the `(user_id, status)` index.
pub async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    status: Option<&str>,
) -> Result<Vec<SessionKeyRow>, DbError> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, SessionKeyRow>(
                r#"
                SELECT id, user_id, chain_id, session_address, encrypted_private_key,
                       owner_address, parent_address, status, security_level, valid_until,
                       created_at, revoked_at, total_used, daily_used, daily_reset_at,
                       last_used_at, encrypted_session_params
                FROM session_keys WHERE user_id = $1 AND status = $2
                "#,
            )
            .bind(user_id)
            .bind(status)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, SessionKeyRow>(
                r#"
                SELECT id, user_id, chain_id, session_address, encrypted_private_key,
                       owner_address, parent_address, status, security_level, valid_until,
                       created_at, revoked_at, total_used, daily_used, daily_reset_at,
                       last_used_at, encrypted_session_params
                FROM session_keys WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
        }
    };

    rows.map_err(DbError::from_sqlx)
}

/// List every `active` session key whose `valid_until` has lapsed, via
/// the `(valid_until)` index. Used by `cleanup_expired` and the monitor.
pub async fn list_lapsed_active(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<SessionKeyRow>, DbError> {
    sqlx::query_as::<_, SessionKeyRow>(
        r#"
        SELECT id, user_id, chain_id, session_address, encrypted_private_key,
               owner_address, parent_address, status, security_level, valid_until,
               created_at, revoked_at, total_used, daily_used, daily_reset_at,
               last_used_at, encrypted_session_params
        FROM session_keys WHERE status = 'active' AND valid_until < $1
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// List every session key currently `active`, for the monitor sweep.
pub async fn list_active(pool: &PgPool) -> Result<Vec<SessionKeyRow>, DbError> {
    list_by_status(pool, "active").await
}

/// List every session key currently in `status`, e.g. `paused` sessions the
/// monitor sweep needs to check for a lapsed re-activation deadline.
pub async fn list_by_status(pool: &PgPool, status: &str) -> Result<Vec<SessionKeyRow>, DbError> {
    sqlx::query_as::<_, SessionKeyRow>(
        r#"
        SELECT id, user_id, chain_id, session_address, encrypted_private_key,
               owner_address, parent_address, status, security_level, valid_until,
               created_at, revoked_at, total_used, daily_used, daily_reset_at,
               last_used_at, encrypted_session_params
        FROM session_keys WHERE status = $1
        "#,
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// Count session keys currently in `status`, for the monitor's metrics.
pub async fn count_by_status(pool: &PgPool, status: &str) -> Result<i64, DbError> {
    let row: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM session_keys WHERE status = $1"#)
        .bind(status)
        .fetch_one(pool)
        .await
        .map_err(DbError::from_sqlx)?;
    Ok(row.0)
}

/// Update usage (`total_used`, `daily_used`, `daily_reset_at`,
/// `last_used_at`) and write a `used` event, in one transaction.
/// `new_daily_used`/`new_daily_reset_at` are computed by the caller
/// (the `session` crate) so the 24h-rolling-window logic stays in one
/// place; this function only persists the already-decided values.
pub async fn apply_usage_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_key_id: Uuid,
    new_total_used: Decimal,
    new_daily_used: Decimal,
    new_daily_reset_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE session_keys
        SET total_used = $1, daily_used = $2, daily_reset_at = $3, last_used_at = $4
        WHERE id = $5
        "#,
    )
    .bind(new_total_used)
    .bind(new_daily_used)
    .bind(new_daily_reset_at)
    .bind(now)
    .bind(session_key_id)
    .execute(&mut **tx)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(())
}

/// Transition a session key's status (e.g. to `expired`, `paused`,
/// `revoked`, or back to `active`), optionally setting `revoked_at`.
pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    revoked_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query(r#"UPDATE session_keys SET status = $1, revoked_at = COALESCE($2, revoked_at) WHERE id = $3"#)
        .bind(status)
        .bind(revoked_at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(DbError::from_sqlx)?;
    Ok(())
}

/// Transition status and write an event in one transaction.
pub async fn set_status_with_event(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    revoked_at: Option<DateTime<Utc>>,
    event_type: &str,
    event_data: serde_json::Value,
    severity: &str,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await.map_err(DbError::from_sqlx)?;

    sqlx::query(r#"UPDATE session_keys SET status = $1, revoked_at = COALESCE($2, revoked_at) WHERE id = $3"#)
        .bind(status)
        .bind(revoked_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from_sqlx)?;

    insert_event_tx(&mut tx, id, event_type, event_data, severity).await?;

    tx.commit().await.map_err(DbError::from_sqlx)?;
    Ok(())
}

/// Append a `SessionEvent` outside of any other transaction.
pub async fn insert_event(
    pool: &PgPool,
    session_key_id: Uuid,
    event_type: &str,
    event_data: serde_json::Value,
    severity: &str,
) -> Result<SessionEventRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query_as::<_, SessionEventRow>(
        r#"
        INSERT INTO session_events (id, session_key_id, event_type, event_data, severity, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, session_key_id, event_type, event_data, severity, timestamp
        "#,
    )
    .bind(id)
    .bind(session_key_id)
    .bind(event_type)
    .bind(event_data)
    .bind(severity)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_sqlx)
}

/// List permissions attached to a session key, within an open transaction
/// (used by `record_usage`'s re-validation of the daily cap).
pub async fn list_permissions_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_key_id: Uuid,
) -> Result<Vec<PermissionRow>, DbError> {
    sqlx::query_as::<_, PermissionRow>(
        r#"
        SELECT id, session_key_id, operation, max_amount_per_tx, max_daily_amount,
               allowed_contracts, require_confirmation, emergency_stop
        FROM session_permissions WHERE session_key_id = $1
        "#,
    )
    .bind(session_key_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(DbError::from_sqlx)
}

/// Append a `SessionEvent` within an open transaction.
pub async fn insert_event_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_key_id: Uuid,
    event_type: &str,
    event_data: serde_json::Value,
    severity: &str,
) -> Result<(), DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO session_events (id, session_key_id, event_type, event_data, severity, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(session_key_id)
    .bind(event_type)
    .bind(event_data)
    .bind(severity)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(DbError::from_sqlx)?;

    Ok(())
}
