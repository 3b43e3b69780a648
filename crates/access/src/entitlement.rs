//! Plan entitlement resolution
//!
//! `resolve` is THE function that answers "which ceilings does this user
//! have right now?". It is pure: same subscription snapshot and instant,
//! same answer. An active premium subscription past its `expires_at` (or
//! one whose plan code fell out of the catalog) resolves as free — no
//! grace.

use chrono::{DateTime, Utc};
use moodmate_shared::{EffectiveLimits, PlanCatalog, PlanTier};
use serde::Serialize;

use crate::subscriptions::Subscription;

/// The ceilings currently granted to a user and the tier they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub tier: PlanTier,
    pub limits: EffectiveLimits,
}

pub fn resolve(
    catalog: &PlanCatalog,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> Entitlement {
    if let Some(sub) = subscription {
        if sub.has_active_period(now) {
            if let Some(spec) = catalog.get(&sub.plan_code) {
                if spec.tier == PlanTier::Premium {
                    return Entitlement {
                        tier: PlanTier::Premium,
                        limits: spec.limits(),
                    };
                }
            }
        }
    }

    Entitlement {
        tier: PlanTier::Free,
        limits: catalog.free_limits(),
    }
}
