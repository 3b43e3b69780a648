//! Subscription lifecycle
//!
//! One subscription record per user; free users have none. The status is a
//! closed enum and transitions go through typed service methods that
//! serialize per user, so concurrent confirmations and expirations cannot
//! race on the same record. Payment confirmation is the source of truth: it
//! is accepted even when local bookkeeping is missing, creating the active
//! record directly.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use moodmate_shared::{PlanCatalog, UserId};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::locks::UserLocks;
use crate::store::SubscriptionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Checkout initiated, payment not yet confirmed.
    PendingPayment,
    /// Payment confirmed; premium entitlement until `expires_at`.
    Active,
    /// Paid period lapsed (or renewal failed after lapse).
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::PendingPayment => "pending_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(SubscriptionStatus::PendingPayment),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub plan_code: String,
    pub status: SubscriptionStatus,
    /// Last time the record moved to `Active` (creation time before that).
    pub renewed_at: DateTime<Utc>,
    /// End of the paid period. Set whenever `status` is `Active`.
    pub expires_at: Option<DateTime<Utc>>,
    /// Outstanding checkout reference handed to the payment provider.
    pub checkout_ref: Option<Uuid>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Active with a paid period covering `now`.
    pub fn has_active_period(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at > now)
    }

    /// Active but the paid period has lapsed.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Reference handed to the payment provider for one checkout attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub reference: Uuid,
    pub plan_code: String,
    pub amount_kes: u32,
}

pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    catalog: PlanCatalog,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn SubscriptionStore>, catalog: PlanCatalog, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
            locks: UserLocks::new(),
        }
    }

    /// Current subscription state, expiring lapsed records lazily. `None`
    /// means the user is on the free tier.
    pub async fn snapshot(&self, user_id: UserId) -> AccessResult<Option<Subscription>> {
        let now = self.clock.now_utc();
        match self.store.get(user_id).await? {
            Some(sub) if sub.has_lapsed(now) => {
                // Lazy expiry; a concurrent sweep may have beaten us to it.
                match self.expire(user_id).await {
                    Ok(expired) => Ok(Some(expired)),
                    Err(AccessError::InvalidTransition { .. }) => self.store.get(user_id).await,
                    Err(e) => Err(e),
                }
            }
            other => Ok(other),
        }
    }

    /// Start a checkout for `plan_code`.
    ///
    /// Idempotent per outstanding checkout: re-initiating for the same plan
    /// reuses the pending reference, a different plan supersedes it. An
    /// active subscription is never demoted to `PendingPayment` — its
    /// entitlement holds until the paid period ends, and only the checkout
    /// reference is refreshed.
    pub async fn initiate_checkout(
        &self,
        user_id: UserId,
        plan_code: &str,
    ) -> AccessResult<CheckoutSession> {
        let spec = self
            .catalog
            .get(plan_code)
            .ok_or_else(|| AccessError::PlanNotFound(plan_code.to_string()))?
            .clone();
        if spec.price_kes == 0 {
            return Err(AccessError::PlanNotPurchasable(spec.code));
        }

        let lock = self.locks.handle(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now_utc();
        let current = self.store.get(user_id).await?;

        let subscription = match current {
            Some(sub)
                if sub.status == SubscriptionStatus::PendingPayment
                    && sub.plan_code.eq_ignore_ascii_case(&spec.code)
                    && sub.checkout_ref.is_some() =>
            {
                // Same plan, checkout still outstanding: reuse it.
                sub
            }
            Some(mut sub) if sub.has_active_period(now) => {
                sub.checkout_ref = Some(Uuid::new_v4());
                sub
            }
            Some(mut sub) => {
                sub.status = SubscriptionStatus::PendingPayment;
                sub.plan_code = spec.code.clone();
                sub.checkout_ref = Some(Uuid::new_v4());
                sub
            }
            None => Subscription {
                user_id,
                plan_code: spec.code.clone(),
                status: SubscriptionStatus::PendingPayment,
                renewed_at: now,
                expires_at: None,
                checkout_ref: Some(Uuid::new_v4()),
            },
        };

        self.store.upsert(&subscription).await?;

        let reference = subscription.checkout_ref.unwrap_or_else(Uuid::new_v4);
        tracing::info!(
            user_id = %user_id,
            plan_code = %spec.code,
            reference = %reference,
            "Checkout initiated"
        );
        Ok(CheckoutSession {
            reference,
            plan_code: spec.code,
            amount_kes: spec.price_kes,
        })
    }

    /// Apply a confirmed payment: the record becomes `Active` on
    /// `plan_code` until `period_end`. Accepted from any prior state — a
    /// confirmation must never be rejected because local bookkeeping is
    /// missing.
    pub async fn confirm_payment(
        &self,
        user_id: UserId,
        plan_code: &str,
        period_end: DateTime<Utc>,
    ) -> AccessResult<Subscription> {
        let spec = self
            .catalog
            .get(plan_code)
            .ok_or_else(|| AccessError::PlanNotFound(plan_code.to_string()))?;

        let lock = self.locks.handle(user_id);
        let _guard = lock.lock().await;

        let previous = self.store.get(user_id).await?;
        let subscription = Subscription {
            user_id,
            plan_code: spec.code.clone(),
            status: SubscriptionStatus::Active,
            renewed_at: self.clock.now_utc(),
            expires_at: Some(period_end),
            checkout_ref: None,
        };
        self.store.upsert(&subscription).await?;

        tracing::info!(
            user_id = %user_id,
            plan_code = %spec.code,
            expires_at = %period_end,
            previous_status = previous.map(|s| s.status.as_str()).unwrap_or("none"),
            "Payment confirmed"
        );
        Ok(subscription)
    }

    /// Record a failed or cancelled payment. Never dropped silently: a
    /// pending checkout stays pending (the user may retry), an active
    /// record whose period already lapsed moves to `Expired`.
    pub async fn record_payment_failure(&self, user_id: UserId) -> AccessResult<()> {
        let lock = self.locks.handle(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now_utc();
        match self.store.get(user_id).await? {
            Some(mut sub) if sub.has_lapsed(now) => {
                sub.status = SubscriptionStatus::Expired;
                self.store.upsert(&sub).await?;
                tracing::warn!(user_id = %user_id, "Renewal payment failed; subscription expired");
            }
            Some(sub) if sub.status == SubscriptionStatus::PendingPayment => {
                tracing::warn!(
                    user_id = %user_id,
                    plan_code = %sub.plan_code,
                    "Payment failed; checkout remains pending"
                );
            }
            other => {
                tracing::warn!(
                    user_id = %user_id,
                    status = other.map(|s| s.status.as_str()).unwrap_or("none"),
                    "Payment failure for user without a matching checkout"
                );
            }
        }
        Ok(())
    }

    /// Expire an active subscription whose paid period has lapsed. Only
    /// legal from `Active` past `expires_at`; anything else is a typed
    /// failure rather than a silent overwrite.
    pub async fn expire(&self, user_id: UserId) -> AccessResult<Subscription> {
        let lock = self.locks.handle(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now_utc();
        let Some(mut sub) = self.store.get(user_id).await? else {
            return Err(AccessError::InvalidTransition {
                from: "none",
                to: "expired",
            });
        };
        if !sub.has_lapsed(now) {
            return Err(AccessError::InvalidTransition {
                from: sub.status.as_str(),
                to: "expired",
            });
        }

        sub.status = SubscriptionStatus::Expired;
        self.store.upsert(&sub).await?;
        tracing::info!(user_id = %user_id, "Subscription expired");
        Ok(sub)
    }

    /// Sweep every lapsed subscription. An optimization over lazy expiry
    /// with identical observable semantics.
    pub async fn expire_overdue(&self) -> AccessResult<u64> {
        let now = self.clock.now_utc();
        let lapsed = self.store.list_lapsed(now).await?;
        let mut expired = 0;
        for sub in lapsed {
            match self.expire(sub.user_id).await {
                Ok(_) => expired += 1,
                // Lost the race to a lazy expiry or a renewal; fine.
                Err(AccessError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}
