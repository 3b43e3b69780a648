//! Shared types for the MoodMate backend
//!
//! Domain types used by every workspace member: user identity, plan tiers,
//! the plan catalog, and the database pool helper.

pub mod db;
pub mod types;

pub use db::create_pool;
pub use types::{EffectiveLimits, PlanCatalog, PlanSpec, PlanTier, UserId};
