//! Access admission gate
//!
//! Composes subscription state, the entitlement resolver, the per-minute
//! rate limiter, and the daily quota ledger into one admit/deny decision.
//! The rate limiter runs first (cheaper, shields the ledger from bursts);
//! a rate denial therefore never consumes daily quota. The quota check is a
//! single check-then-reserve — callers get no separate "check" and
//! "consume" operations to race between.

use std::sync::Arc;
use std::time::Duration;

use moodmate_shared::{PlanCatalog, PlanTier, UserId};
use serde::Serialize;

use crate::clock::Clock;
use crate::entitlement::{self, Entitlement};
use crate::error::AccessResult;
use crate::quota::{QuotaLedger, Reservation};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::subscriptions::SubscriptionService;

/// The single admission decision for one AI-analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted {
        plan: PlanTier,
        /// Daily units left after this reservation.
        remaining_today: u32,
    },
    DeniedRateLimit {
        retry_after: Duration,
    },
    DeniedQuota {
        retry_after: Duration,
        /// Current plan, for the caller's upsell message.
        plan: PlanTier,
    },
}

/// Read-only quota standing for one user (introspection endpoint).
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub plan: PlanTier,
    pub quota_day: String,
    pub consumed: u32,
    pub daily_quota: u32,
    pub remaining: u32,
    pub per_minute_limit: u32,
}

pub struct AccessGate {
    subscriptions: Arc<SubscriptionService>,
    catalog: PlanCatalog,
    rate_limiter: RateLimiter,
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    pub fn new(
        subscriptions: Arc<SubscriptionService>,
        catalog: PlanCatalog,
        rate_limiter: RateLimiter,
        ledger: QuotaLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            rate_limiter,
            ledger,
            clock,
        }
    }

    /// Decide whether one AI-analysis request may proceed, reserving its
    /// quota unit on admission.
    pub async fn admit(&self, user_id: UserId) -> AccessResult<AdmissionDecision> {
        let entitlement = self.current_entitlement(user_id).await?;

        match self
            .rate_limiter
            .try_admit(user_id, entitlement.limits.per_minute_limit)
            .await?
        {
            RateDecision::Admitted { .. } => {}
            RateDecision::Denied { retry_after } => {
                return Ok(AdmissionDecision::DeniedRateLimit { retry_after });
            }
        }

        match self
            .ledger
            .try_reserve(user_id, entitlement.limits.daily_quota)
            .await?
        {
            Reservation::Admitted { remaining } => Ok(AdmissionDecision::Admitted {
                plan: entitlement.tier,
                remaining_today: remaining,
            }),
            Reservation::Denied { retry_after } => Ok(AdmissionDecision::DeniedQuota {
                retry_after,
                plan: entitlement.tier,
            }),
        }
    }

    /// Quota standing without consuming anything.
    pub async fn usage(&self, user_id: UserId) -> AccessResult<QuotaStatus> {
        let entitlement = self.current_entitlement(user_id).await?;
        let usage = self.ledger.peek(user_id).await?;
        Ok(QuotaStatus {
            plan: entitlement.tier,
            quota_day: usage.quota_day,
            consumed: usage.consumed,
            daily_quota: entitlement.limits.daily_quota,
            remaining: entitlement.limits.daily_quota.saturating_sub(usage.consumed),
            per_minute_limit: entitlement.limits.per_minute_limit,
        })
    }

    async fn current_entitlement(&self, user_id: UserId) -> AccessResult<Entitlement> {
        let subscription = self.subscriptions.snapshot(user_id).await?;
        Ok(entitlement::resolve(
            &self.catalog,
            subscription.as_ref(),
            self.clock.now_utc(),
        ))
    }
}
