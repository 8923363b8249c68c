//! The Session Monitor: a scheduled sweep over every `active`
//! session key that expires lapsed sessions, tracks spending/velocity/
//! pattern anomalies, pauses sessions that cross a threshold, and resets
//! daily usage windows.
//!
//! Pausing persists its re-activation deadline as a `SessionEvent`
//! (`eventType = "paused"`, `eventData.reactivate_at`) rather than an
//! in-memory timer: a process restart loses nothing because the
//! next sweep re-derives which paused sessions are due back by reading
//! that event, not by consulting a live `tokio::time::sleep` handle.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::models::{SessionKeyRow, SessionTransactionRow};
use db::repository::{session_events, session_keys, session_transactions};
use db::DbPool;

use crate::error::SessionError;

const VELOCITY_5M_THRESHOLD: usize = 10;
const VELOCITY_1H_THRESHOLD: usize = 100;
const PATTERN_MIN_TRANSACTIONS: usize = 5;
const PATTERN_BUCKET_THRESHOLD: usize = 10;
const ROUND_NUMBER_RATIO: f64 = 0.8;

/// Tuning knobs for the sweep.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sweep_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { sweep_interval: Duration::from_secs(5 * 60) }
    }
}

/// One anomaly surfaced by a sweep pass, already written as a
/// `SessionEvent` by the time it's returned.
#[derive(Debug, Clone)]
pub struct Alert {
    pub session_key_id: Uuid,
    pub alert_type: &'static str,
    pub severity: &'static str,
}

/// Summary of one full sweep across every active session key.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub expired: usize,
    pub paused: usize,
    pub reactivated: usize,
    pub daily_resets: usize,
    pub alerts: Vec<Alert>,
}

/// Point-in-time counts exposed as the monitor's metrics surface.
#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    pub active_sessions: i64,
    pub paused_sessions: i64,
    pub expired_sessions: i64,
    pub alerts_last_24h: i64,
    pub top_alert_types: Vec<(String, i64)>,
}

/// The scheduled session monitor.
#[derive(Clone)]
pub struct SessionMonitor {
    pool: DbPool,
    config: MonitorConfig,
}

impl SessionMonitor {
    pub fn new(pool: DbPool, config: MonitorConfig) -> Self {
        Self { pool, config }
    }

    /// Run the sweep on `config.sweep_interval` until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("session monitor starting (sweep_interval = {:?})", self.config.sweep_interval);
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.sweep_once().await;
                    info!(
                        expired = report.expired,
                        paused = report.paused,
                        reactivated = report.reactivated,
                        daily_resets = report.daily_resets,
                        alerts = report.alerts.len(),
                        "session monitor sweep complete"
                    );
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("session monitor shutting down");
    }

    /// Run one sweep pass immediately. Exposed for tests and for the CLI's
    /// `session sweep` one-shot subcommand.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = Utc::now();

        report.reactivated = self.reactivate_due_paused(now).await;

        let active = match session_keys::list_active(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("session monitor failed to list active session keys: {e}");
                return report;
            }
        };

        for key in active {
            if let Err(e) = self.sweep_one(&key, now, &mut report).await {
                warn!("session monitor swallowing error for session key {}: {e}", key.id);
            }
        }

        report
    }

    /// Compute the metrics surface (`activeSessions`, `alertsLast24h`,
    /// `pausedSessions`, `expiredSessions`, `topAlertTypes`).
    pub async fn metrics(&self) -> Result<MonitorMetrics, SessionError> {
        let since = Utc::now() - ChronoDuration::hours(24);

        Ok(MonitorMetrics {
            active_sessions: session_keys::count_by_status(&self.pool, "active").await?,
            paused_sessions: session_keys::count_by_status(&self.pool, "paused").await?,
            expired_sessions: session_keys::count_by_status(&self.pool, "expired").await?,
            alerts_last_24h: session_events::count_since(&self.pool, "warning", since).await?
                + session_events::count_since(&self.pool, "critical", since).await?,
            top_alert_types: session_events::count_by_type_since(&self.pool, since).await?,
        })
    }

    async fn sweep_one(
        &self,
        key: &SessionKeyRow,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), SessionError> {
        // Step 1: expiry.
        if now > key.valid_until {
            session_keys::set_status_with_event(
                &self.pool,
                key.id,
                "expired",
                None,
                "expired",
                serde_json::json!({ "reason": "valid_until lapsed" }),
                "info",
            )
            .await?;
            report.expired += 1;
            return Ok(());
        }

        let permissions = session_keys::list_permissions(&self.pool, key.id).await?;
        let max_daily_amount = permissions.iter().map(|p| p.max_daily_amount).max();

        let window_start = now - ChronoDuration::hours(24);
        let transactions = session_transactions::list_since(&self.pool, key.id, window_start).await?;

        let mut should_pause: Option<(&'static str, Duration)> = None;

        // Step 2: spending check.
        if let Some(cap) = max_daily_amount.filter(|c| !c.is_zero()) {
            let daily_spend: Decimal = transactions.iter().map(|t| t.amount).sum();
            let usage = daily_spend / cap;

            if usage >= Decimal::ONE {
                self.alert(key.id, "spending", "critical", report).await?;
                should_pause = Some(("spending_cap_exceeded", Duration::from_secs(0)));
            } else if usage >= Decimal::new(95, 2) {
                self.alert(key.id, "spending", "critical", report).await?;
            } else if usage >= Decimal::new(80, 2) {
                self.alert(key.id, "spending", "high", report).await?;
            }
        }

        // Step 3: velocity check.
        let five_min_count = count_since(&transactions, now - ChronoDuration::minutes(5));
        let one_hour_count = count_since(&transactions, now - ChronoDuration::hours(1));

        if one_hour_count > VELOCITY_1H_THRESHOLD {
            self.alert(key.id, "velocity", "critical", report).await?;
            should_pause = should_pause.or(Some(("velocity_hourly", Duration::from_secs(60 * 60))));
        } else if five_min_count > VELOCITY_5M_THRESHOLD {
            self.alert(key.id, "velocity", "high", report).await?;
            should_pause = should_pause.or(Some(("velocity_5min", Duration::from_secs(10 * 60))));
        }

        // Step 4: pattern check.
        if transactions.len() >= PATTERN_MIN_TRANSACTIONS {
            if let Some(bucket) = dominant_bucket(&transactions) {
                if bucket > PATTERN_BUCKET_THRESHOLD {
                    self.alert(key.id, "pattern", "medium", report).await?;
                }
            }

            let round_ratio = round_number_ratio(&transactions);
            if round_ratio > ROUND_NUMBER_RATIO {
                self.alert(key.id, "pattern", "low", report).await?;
            }
        }

        // Step 5: daily-reset.
        if now - key.daily_reset_at >= ChronoDuration::hours(24) {
            let mut tx = self.pool.begin().await.map_err(db::DbError::from_sqlx)?;
            let locked = session_keys::get_session_key_for_update(&mut tx, key.id).await?;
            if now - locked.daily_reset_at >= ChronoDuration::hours(24) {
                session_keys::apply_usage_tx(&mut tx, key.id, locked.total_used, Decimal::ZERO, now, locked.last_used_at.unwrap_or(now))
                    .await?;
                session_keys::insert_event_tx(
                    &mut tx,
                    key.id,
                    "used",
                    serde_json::json!({ "action": "daily_usage_reset" }),
                    "info",
                )
                .await?;
                tx.commit().await.map_err(db::DbError::from_sqlx)?;
                report.daily_resets += 1;
            } else {
                tx.rollback().await.map_err(db::DbError::from_sqlx)?;
            }
        }

        if let Some((reason, duration)) = should_pause {
            self.pause(key.id, now, duration, reason).await?;
            report.paused += 1;
        }

        Ok(())
    }

    async fn alert(
        &self,
        session_key_id: Uuid,
        alert_type: &'static str,
        severity: &'static str,
        report: &mut SweepReport,
    ) -> Result<(), SessionError> {
        session_keys::insert_event(
            &self.pool,
            session_key_id,
            "security_alert",
            serde_json::json!({ "alertType": alert_type }),
            severity,
        )
        .await?;
        report.alerts.push(Alert { session_key_id, alert_type, severity });
        Ok(())
    }

    async fn pause(
        &self,
        session_key_id: Uuid,
        now: DateTime<Utc>,
        duration: Duration,
        reason: &str,
    ) -> Result<(), SessionError> {
        let reactivate_at = now + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());

        session_keys::set_status_with_event(
            &self.pool,
            session_key_id,
            "paused",
            None,
            "paused",
            serde_json::json!({ "reason": reason, "reactivate_at": reactivate_at }),
            "warning",
        )
        .await?;

        Ok(())
    }

    /// Re-activate every `paused` session whose persisted deadline has
    /// passed, re-checking `validUntil` first so a session that expired
    /// while paused goes straight to `expired` instead of bouncing back
    /// through `active`.
    async fn reactivate_due_paused(&self, now: DateTime<Utc>) -> usize {
        let paused = match session_keys::list_by_status(&self.pool, "paused").await {
            Ok(rows) => rows,
            Err(e) => {
                error!("session monitor failed to list paused session keys: {e}");
                return 0;
            }
        };

        let mut reactivated = 0;
        for key in paused {
            let events = match session_events::list_for_session(&self.pool, key.id).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("failed to load events for paused session {}: {e}", key.id);
                    continue;
                }
            };

            let reactivate_at = events
                .iter()
                .rev()
                .find(|e| e.event_type == "paused")
                .and_then(|e| e.event_data.get("reactivate_at"))
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            let Some(reactivate_at) = reactivate_at else { continue };
            if now < reactivate_at {
                continue;
            }

            if now > key.valid_until {
                let _ = session_keys::set_status_with_event(
                    &self.pool,
                    key.id,
                    "expired",
                    None,
                    "expired",
                    serde_json::json!({ "reason": "valid_until lapsed while paused" }),
                    "info",
                )
                .await;
                continue;
            }

            if let Err(e) = session_keys::set_status_with_event(
                &self.pool,
                key.id,
                "active",
                None,
                "used",
                serde_json::json!({ "action": "reactivated" }),
                "info",
            )
            .await
            {
                warn!("failed to reactivate session {}: {e}", key.id);
                continue;
            }

            reactivated += 1;
        }

        reactivated
    }
}

fn count_since(transactions: &[SessionTransactionRow], since: DateTime<Utc>) -> usize {
    transactions.iter().filter(|t| t.created_at >= since).count()
}

/// Largest `(toAddress, amount)` bucket among `transactions`.
fn dominant_bucket(transactions: &[SessionTransactionRow]) -> Option<usize> {
    let mut buckets: HashMap<(String, String), usize> = HashMap::new();
    for t in transactions {
        *buckets.entry((t.to_address.clone(), t.amount.to_string())).or_insert(0) += 1;
    }
    buckets.into_values().max()
}

/// Fraction of `transactions` whose amount has no fractional part.
fn round_number_ratio(transactions: &[SessionTransactionRow]) -> f64 {
    if transactions.is_empty() {
        return 0.0;
    }
    let round_count = transactions.iter().filter(|t| t.amount.fract().is_zero()).count();
    round_count as f64 / transactions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn tx(amount: &str, to: &str, minutes_ago: i64) -> SessionTransactionRow {
        SessionTransactionRow {
            id: Uuid::new_v4(),
            session_key_id: Uuid::new_v4(),
            amount: Decimal::from_str(amount).unwrap(),
            to_address: to.to_string(),
            transaction_hash: None,
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    #[test]
    fn counts_transactions_within_window() {
        let txs = vec![tx("1", "0xA", 1), tx("1", "0xA", 10), tx("1", "0xA", 120)];
        assert_eq!(count_since(&txs, Utc::now() - ChronoDuration::minutes(5)), 1);
        assert_eq!(count_since(&txs, Utc::now() - ChronoDuration::hours(1)), 2);
    }

    #[test]
    fn dominant_bucket_finds_largest_group() {
        let mut txs = vec![];
        for _ in 0..11 {
            txs.push(tx("5", "0xSAME", 1));
        }
        txs.push(tx("5", "0xOTHER", 1));
        assert_eq!(dominant_bucket(&txs), Some(11));
    }

    #[test]
    fn round_number_ratio_detects_mostly_integer_amounts() {
        let txs = vec![tx("10", "0xA", 1), tx("20", "0xA", 1), tx("5.5", "0xA", 1), tx("30", "0xA", 1)];
        assert!(round_number_ratio(&txs) > 0.8 - f64::EPSILON);
    }

    #[test]
    fn empty_transactions_have_zero_round_ratio() {
        assert_eq!(round_number_ratio(&[]), 0.0);
    }
}
