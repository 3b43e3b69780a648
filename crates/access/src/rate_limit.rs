//! Per-minute rate limiting
//!
//! Fixed one-minute buckets keyed by `(user, epoch minute)`, fully
//! independent of the daily quota ledger: a request can hit the minute
//! throttle with daily quota to spare, and vice versa. Bucket state is
//! ephemeral; losing it on restart only degrades short-term throttling
//! precision.

use std::sync::Arc;
use std::time::Duration;

use moodmate_shared::UserId;

use crate::clock::Clock;
use crate::error::AccessResult;
use crate::store::{memory::InMemoryCounterStore, CounterStore};

/// Outcome of a rate-limit admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted {
        /// Requests left in the current minute bucket.
        remaining: u32,
    },
    Denied {
        /// Time until the bucket boundary.
        retry_after: Duration,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Buckets linger briefly past their minute for late stragglers, then
    /// expire (or get swept).
    const BUCKET_TTL: Duration = Duration::from_secs(120);

    pub fn new(counters: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { counters, clock }
    }

    /// Limiter backed by a process-local map.
    pub fn new_in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), clock)
    }

    fn key(minute: i64, user_id: UserId) -> String {
        format!("rate:{minute}:{user_id}")
    }

    /// Admit one request under `limit` for the current minute bucket.
    pub async fn try_admit(&self, user_id: UserId, limit: u32) -> AccessResult<RateDecision> {
        let now = self.clock.now_utc();
        let minute = now.timestamp().div_euclid(60);
        let update = self
            .counters
            .compare_and_increment(&Self::key(minute, user_id), limit, Self::BUCKET_TTL)
            .await?;

        if update.admitted {
            Ok(RateDecision::Admitted {
                remaining: limit.saturating_sub(update.count),
            })
        } else {
            let boundary_ms = (minute + 1) * 60_000;
            let wait_ms = (boundary_ms - now.timestamp_millis()).max(0) as u64;
            tracing::debug!(
                user_id = %user_id,
                limit = limit,
                retry_after_ms = wait_ms,
                "Rate limit denied"
            );
            Ok(RateDecision::Denied {
                retry_after: Duration::from_millis(wait_ms),
            })
        }
    }

    /// Sweep buckets that ended between two and one hours ago. Only needed
    /// for backends without native expiry.
    pub async fn purge_stale(&self) -> AccessResult<u64> {
        let now_minute = self.clock.now_utc().timestamp().div_euclid(60);
        let mut removed = 0;
        for minute in (now_minute - 120)..(now_minute - 60) {
            removed += self
                .counters
                .remove_prefix(&format!("rate:{minute}:"))
                .await?;
        }
        Ok(removed)
    }
}
