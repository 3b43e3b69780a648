//! PostgreSQL store backends
//!
//! All mutations ride single statements with `INSERT ... ON CONFLICT ...
//! RETURNING`, so concurrent callers race inside the database rather than in
//! application code. Schema lives in `migrations/0001_access.sql`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodmate_shared::UserId;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CounterStore, CounterUpdate, EventClaim, SubscriptionStore, WebhookStore};
use crate::error::{AccessError, AccessResult};
use crate::subscriptions::{Subscription, SubscriptionStatus};

pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn compare_and_increment(
        &self,
        key: &str,
        ceiling: u32,
        _ttl: Duration,
    ) -> AccessResult<CounterUpdate> {
        if ceiling == 0 {
            let count = self.get(key).await?;
            return Ok(CounterUpdate {
                admitted: false,
                count,
            });
        }

        // Succeeds (returns the new value) only when the pre-increment value
        // is still below the ceiling; otherwise no row comes back.
        let admitted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO quota_counters (key, value, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = quota_counters.value + 1,
                updated_at = NOW()
            WHERE quota_counters.value < $2
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(i64::from(ceiling))
        .fetch_optional(&self.pool)
        .await?;

        match admitted {
            Some((value,)) => Ok(CounterUpdate {
                admitted: true,
                count: value.max(0) as u32,
            }),
            None => {
                let count = self.get(key).await?;
                Ok(CounterUpdate {
                    admitted: false,
                    count,
                })
            }
        }
    }

    async fn get(&self, key: &str) -> AccessResult<u32> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT value FROM quota_counters WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value.max(0) as u32).unwrap_or(0))
    }

    async fn remove_prefix(&self, prefix: &str) -> AccessResult<u64> {
        let result = sqlx::query("DELETE FROM quota_counters WHERE key LIKE $1 || '%'")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    user_id: Uuid,
    plan_code: String,
    status: String,
    renewed_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    checkout_ref: Option<Uuid>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = AccessError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SubscriptionStatus>()
            .map_err(|_| AccessError::Storage(format!("bad subscription status {}", row.status)))?;
        Ok(Subscription {
            user_id: UserId::from(row.user_id),
            plan_code: row.plan_code,
            status,
            renewed_at: row.renewed_at,
            expires_at: row.expires_at,
            checkout_ref: row.checkout_ref,
        })
    }
}

pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn get(&self, user_id: UserId) -> AccessResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, plan_code, status, renewed_at, expires_at, checkout_ref
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn upsert(&self, subscription: &Subscription) -> AccessResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, plan_code, status, renewed_at, expires_at, checkout_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                plan_code = EXCLUDED.plan_code,
                status = EXCLUDED.status,
                renewed_at = EXCLUDED.renewed_at,
                expires_at = EXCLUDED.expires_at,
                checkout_ref = EXCLUDED.checkout_ref
            "#,
        )
        .bind(subscription.user_id.0)
        .bind(&subscription.plan_code)
        .bind(subscription.status.as_str())
        .bind(subscription.renewed_at)
        .bind(subscription.expires_at)
        .bind(subscription.checkout_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_lapsed(&self, now: DateTime<Utc>) -> AccessResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, plan_code, status, renewed_at, expires_at, checkout_ref
            FROM subscriptions
            WHERE status = 'active'
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }
}

pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn try_claim(&self, event_id: &str, _now: DateTime<Utc>) -> AccessResult<EventClaim> {
        // The insert atomically claims exclusive processing rights; the ON
        // CONFLICT branch only fires for claims stuck in processing past the
        // staleness window (crash recovery).
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (event_id, state, claimed_at)
            VALUES ($1, 'processing', NOW())
            ON CONFLICT (event_id) DO UPDATE SET
                state = 'processing',
                claimed_at = NOW()
            WHERE webhook_events.state = 'processing'
              AND webhook_events.claimed_at < NOW() - ($2 || ' seconds')::INTERVAL
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(super::CLAIM_STALE_AFTER_SECS)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(EventClaim::Claimed);
        }

        let state: Option<(String,)> =
            sqlx::query_as("SELECT state FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        match state.as_ref().map(|(s,)| s.as_str()) {
            Some("applied") => Ok(EventClaim::AlreadyApplied),
            // Processing, or the row vanished between statements (a release
            // racing us); either way another delivery owns it right now.
            _ => Ok(EventClaim::InFlight),
        }
    }

    async fn mark_applied(&self, event_id: &str) -> AccessResult<()> {
        sqlx::query(
            "UPDATE webhook_events SET state = 'applied', applied_at = NOW() WHERE event_id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, event_id: &str) -> AccessResult<()> {
        sqlx::query("DELETE FROM webhook_events WHERE event_id = $1 AND state = 'processing'")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
