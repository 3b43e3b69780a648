//! Daily quota ledger
//!
//! Per-user, per-quota-day counter of consumed AI calls. The ceiling is
//! supplied by the caller at reservation time (from the entitlement
//! resolver), never stored on the counter, so a plan change applies to the
//! very next reservation without a migration step. Counters are created
//! lazily and swept after [`QuotaLedger::RETENTION_DAYS`].

use std::sync::Arc;
use std::time::Duration;

use moodmate_shared::UserId;
use serde::Serialize;

use crate::clock::{Clock, QuotaCalendar};
use crate::error::AccessResult;
use crate::store::CounterStore;

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Admitted {
        /// Units left under the supplied ceiling after this reservation.
        remaining: u32,
    },
    Denied {
        /// Time until the next local-midnight reset.
        retry_after: Duration,
    },
}

/// Read-only view of a user's counter for the current quota day.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaUsage {
    pub consumed: u32,
    pub quota_day: String,
}

#[derive(Clone)]
pub struct QuotaLedger {
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    calendar: QuotaCalendar,
}

impl QuotaLedger {
    /// Days a finished counter is kept before the sweep may drop it.
    pub const RETENTION_DAYS: i64 = 2;

    const COUNTER_TTL: Duration = Duration::from_secs(48 * 60 * 60);

    pub fn new(counters: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, calendar: QuotaCalendar) -> Self {
        Self {
            counters,
            clock,
            calendar,
        }
    }

    fn key(user_id: UserId, quota_day: &str) -> String {
        // Day first so a whole day can be swept by prefix.
        format!("quota:{quota_day}:{user_id}")
    }

    /// Atomically reserve one unit against `ceiling` for the current quota
    /// day. Admission and increment are one operation; there is no separate
    /// check-then-consume surface.
    pub async fn try_reserve(&self, user_id: UserId, ceiling: u32) -> AccessResult<Reservation> {
        let now = self.clock.now_utc();
        let quota_day = self.calendar.quota_day_key(now);
        let update = self
            .counters
            .compare_and_increment(&Self::key(user_id, &quota_day), ceiling, Self::COUNTER_TTL)
            .await?;

        if update.admitted {
            Ok(Reservation::Admitted {
                remaining: ceiling.saturating_sub(update.count),
            })
        } else {
            tracing::debug!(
                user_id = %user_id,
                quota_day = %quota_day,
                consumed = update.count,
                ceiling = ceiling,
                "Daily quota reservation denied"
            );
            Ok(Reservation::Denied {
                retry_after: self.calendar.until_next_reset(now),
            })
        }
    }

    /// Read the current day's consumption without mutating it.
    pub async fn peek(&self, user_id: UserId) -> AccessResult<QuotaUsage> {
        let now = self.clock.now_utc();
        let quota_day = self.calendar.quota_day_key(now);
        let consumed = self.counters.get(&Self::key(user_id, &quota_day)).await?;
        Ok(QuotaUsage {
            consumed,
            quota_day,
        })
    }

    /// Drop every counter belonging to `quota_day`. Retention is an
    /// operational concern; correctness never depends on deletion.
    pub async fn purge_day(&self, quota_day: &str) -> AccessResult<u64> {
        let removed = self
            .counters
            .remove_prefix(&format!("quota:{quota_day}"))
            .await?;
        if removed > 0 {
            tracing::info!(quota_day = %quota_day, removed = removed, "Purged quota counters");
        }
        Ok(removed)
    }

    pub fn calendar(&self) -> QuotaCalendar {
        self.calendar
    }
}
