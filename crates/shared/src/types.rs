//! Core domain types
//!
//! Plan data is immutable catalog data loaded at process start. The catalog
//! owns the quota/throttle ceilings per plan; subscription state decides which
//! plan applies to a user at any instant.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a user.
///
/// Issued and verified by the identity service; this workspace references it
/// but never mints or validates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanTier::Free => write!(f, "free"),
            PlanTier::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "premium" => Ok(PlanTier::Premium),
            _ => Err(()),
        }
    }
}

/// Ceilings currently granted to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    /// AI analysis calls per quota day
    pub daily_quota: u32,
    /// AI analysis calls per minute
    pub per_minute_limit: u32,
}

/// One purchasable plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    /// Stable catalog code (e.g. `PREMIUM_MONTHLY`)
    pub code: String,
    pub name: String,
    pub tier: PlanTier,
    /// Price in Kenyan Shillings
    pub price_kes: u32,
    /// Paid period granted per confirmed payment
    pub duration_days: i64,
    pub daily_quota: u32,
    pub per_minute_limit: u32,
}

impl PlanSpec {
    pub fn duration(&self) -> Duration {
        Duration::days(self.duration_days)
    }

    pub fn limits(&self) -> EffectiveLimits {
        EffectiveLimits {
            daily_quota: self.daily_quota,
            per_minute_limit: self.per_minute_limit,
        }
    }
}

/// Immutable plan catalog, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanSpec>,
}

const DEFAULT_FREE_DAILY_CALLS: u32 = 5;
const DEFAULT_PREMIUM_DAILY_CALLS: u32 = 200;
const DEFAULT_CALLS_PER_MINUTE: u32 = 60;

impl PlanCatalog {
    /// Catalog with the reference plans and ceilings.
    pub fn with_ceilings(free_daily: u32, premium_daily: u32, per_minute: u32) -> Self {
        Self {
            plans: vec![
                PlanSpec {
                    code: "FREE".to_string(),
                    name: "Free Plan".to_string(),
                    tier: PlanTier::Free,
                    price_kes: 0,
                    duration_days: 365,
                    daily_quota: free_daily,
                    per_minute_limit: per_minute,
                },
                PlanSpec {
                    code: "PREMIUM_MONTHLY".to_string(),
                    name: "Premium Monthly".to_string(),
                    tier: PlanTier::Premium,
                    price_kes: 499,
                    duration_days: 30,
                    daily_quota: premium_daily,
                    per_minute_limit: per_minute,
                },
                PlanSpec {
                    code: "PREMIUM_YEARLY".to_string(),
                    name: "Premium Yearly".to_string(),
                    tier: PlanTier::Premium,
                    price_kes: 4999,
                    duration_days: 365,
                    daily_quota: premium_daily,
                    per_minute_limit: per_minute,
                },
            ],
        }
    }

    /// Load the catalog, honoring ceiling overrides from the environment.
    pub fn from_env() -> Self {
        let free_daily = env_u32("FREE_DAILY_AI_CALLS", DEFAULT_FREE_DAILY_CALLS);
        let premium_daily = env_u32("PREMIUM_DAILY_AI_CALLS", DEFAULT_PREMIUM_DAILY_CALLS);
        let per_minute = env_u32("AI_CALLS_PER_MINUTE", DEFAULT_CALLS_PER_MINUTE);
        Self::with_ceilings(free_daily, premium_daily, per_minute)
    }

    /// Look up a plan by code (case-insensitive).
    pub fn get(&self, code: &str) -> Option<&PlanSpec> {
        self.plans
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    /// Ceilings applied to users without an active paid subscription.
    pub fn free_limits(&self) -> EffectiveLimits {
        self.plans
            .iter()
            .find(|p| p.tier == PlanTier::Free)
            .map(PlanSpec::limits)
            .unwrap_or(EffectiveLimits {
                daily_quota: DEFAULT_FREE_DAILY_CALLS,
                per_minute_limit: DEFAULT_CALLS_PER_MINUTE,
            })
    }

    pub fn plans(&self) -> &[PlanSpec] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::with_ceilings(
            DEFAULT_FREE_DAILY_CALLS,
            DEFAULT_PREMIUM_DAILY_CALLS,
            DEFAULT_CALLS_PER_MINUTE,
        )
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_is_case_insensitive() {
        let catalog = PlanCatalog::default();
        assert!(catalog.get("premium_monthly").is_some());
        assert!(catalog.get("PREMIUM_MONTHLY").is_some());
        assert!(catalog.get("GOLD").is_none());
    }

    #[test]
    fn reference_ceilings() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.free_limits().daily_quota, 5);
        let premium = catalog.get("PREMIUM_MONTHLY").unwrap();
        assert_eq!(premium.daily_quota, 200);
        assert_eq!(premium.per_minute_limit, 60);
        assert_eq!(premium.duration_days, 30);
    }

    #[test]
    fn tier_round_trips_through_strings() {
        assert_eq!("premium".parse::<PlanTier>(), Ok(PlanTier::Premium));
        assert_eq!("FREE".parse::<PlanTier>(), Ok(PlanTier::Free));
        assert!("gold".parse::<PlanTier>().is_err());
        assert_eq!(PlanTier::Premium.to_string(), "premium");
    }
}
