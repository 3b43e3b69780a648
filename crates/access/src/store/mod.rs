//! Storage capabilities
//!
//! The mutable state of the access core lives behind three narrow traits so
//! single-process deployments can run on mutex-guarded maps while
//! multi-process deployments point the same services at PostgreSQL (or, for
//! the counter capability, Redis). Nothing above this layer takes a global
//! lock; every operation is atomic per key.

pub mod memory;
pub mod postgres;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodmate_shared::UserId;
use sqlx::PgPool;

use crate::error::AccessResult;
use crate::subscriptions::Subscription;

/// Result of a compare-and-increment call.
#[derive(Debug, Clone, Copy)]
pub struct CounterUpdate {
    pub admitted: bool,
    /// Counter value after the call: post-increment when admitted, the
    /// current value when denied.
    pub count: u32,
}

/// Atomic counter capability shared by the quota ledger and rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` by one iff the pre-increment value is
    /// below `ceiling`. Two concurrent callers must never both observe a
    /// value below the ceiling and both increment past it.
    ///
    /// `ttl` is advisory: backends with native expiry use it, the others
    /// rely on [`CounterStore::remove_prefix`] sweeps.
    async fn compare_and_increment(
        &self,
        key: &str,
        ceiling: u32,
        ttl: Duration,
    ) -> AccessResult<CounterUpdate>;

    /// Read a counter without mutating it. Missing keys read as zero.
    async fn get(&self, key: &str) -> AccessResult<u32>;

    /// Delete counters whose key starts with `prefix`; returns how many
    /// were removed.
    async fn remove_prefix(&self, prefix: &str) -> AccessResult<u64>;
}

/// One subscription record per user; free users have none.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> AccessResult<Option<Subscription>>;
    async fn upsert(&self, subscription: &Subscription) -> AccessResult<()>;
    /// Active subscriptions whose paid period lapsed before `now`.
    async fn list_lapsed(&self, now: DateTime<Utc>) -> AccessResult<Vec<Subscription>>;
}

/// Outcome of claiming a webhook event id for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    /// This caller holds exclusive processing rights for the event.
    Claimed,
    /// The event was fully applied by an earlier delivery.
    AlreadyApplied,
    /// Another handler currently holds a fresh claim on the event.
    InFlight,
}

/// Durable seen-set for webhook event ids.
///
/// Claims follow claim -> apply -> commit: `try_claim` takes exclusive
/// processing rights, `mark_applied` commits after the state transition, and
/// `release` drops a claim whose apply failed so re-delivery can retry. A
/// claim left in the processing state longer than the staleness window may
/// be re-claimed, so a crash mid-handling cannot wedge an event id.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn try_claim(&self, event_id: &str, now: DateTime<Utc>) -> AccessResult<EventClaim>;
    async fn mark_applied(&self, event_id: &str) -> AccessResult<()>;
    async fn release(&self, event_id: &str) -> AccessResult<()>;
}

/// How long a processing claim may sit before re-delivery can steal it.
pub(crate) const CLAIM_STALE_AFTER_SECS: i64 = 30 * 60;

/// The store backends behind one deployment.
#[derive(Clone)]
pub struct AccessStores {
    pub counters: Arc<dyn CounterStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub webhook_events: Arc<dyn WebhookStore>,
}

impl AccessStores {
    /// Mutex-guarded maps, suitable for tests and single-process runs.
    pub fn in_memory() -> Self {
        Self {
            counters: Arc::new(memory::InMemoryCounterStore::new()),
            subscriptions: Arc::new(memory::InMemorySubscriptionStore::new()),
            webhook_events: Arc::new(memory::InMemoryWebhookStore::new()),
        }
    }

    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            counters: Arc::new(postgres::PgCounterStore::new(pool.clone())),
            subscriptions: Arc::new(postgres::PgSubscriptionStore::new(pool.clone())),
            webhook_events: Arc::new(postgres::PgWebhookStore::new(pool)),
        }
    }
}
