// Access crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! MoodMate Access Core
//!
//! Decides, for every inbound AI-analysis request, whether the caller may
//! proceed and under which plan, and keeps that answer consistent while
//! money moves asynchronously through the payment provider's webhook.
//!
//! ## Components
//!
//! - **Quota Ledger**: per-user, per-day counters with atomic reserve
//! - **Rate Limiter**: independent per-minute admission gate
//! - **Entitlement Resolver**: subscription snapshot -> ceilings
//! - **Access Gate**: the single admit/deny decision
//! - **Analysis Orchestrator**: gated emotion classification + advice
//! - **Subscription State Machine**: Free / PendingPayment / Active / Expired
//! - **Webhook Reconciler**: verified, exactly-once payment events

pub mod advice;
pub mod analysis;
pub mod clock;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod locks;
pub mod quota;
pub mod rate_limit;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Advice
pub use advice::{EmotionLabel, DISCLAIMER};

// Analysis
pub use analysis::{
    AnalysisResult, AnalysisService, EmotionClassifier, EmotionScore, HttpEmotionClassifier,
    InMemoryMoodLog, MoodLogEntry, MoodLogSink,
};

// Clock
pub use clock::{Clock, ManualClock, QuotaCalendar, SystemClock};

// Entitlement
pub use entitlement::{resolve, Entitlement};

// Error
pub use error::{AccessError, AccessResult};

// Gate
pub use gate::{AccessGate, AdmissionDecision, QuotaStatus};

// Quota
pub use quota::{QuotaLedger, QuotaUsage, Reservation};

// Rate limit
pub use rate_limit::{RateDecision, RateLimiter};

// Store
pub use store::{AccessStores, CounterStore, SubscriptionStore, WebhookStore};

// Subscriptions
pub use subscriptions::{
    CheckoutSession, Subscription, SubscriptionService, SubscriptionStatus,
};

// Webhooks
pub use webhooks::{sign_payload, WebhookEvent, WebhookOutcome, WebhookReconciler};

use std::sync::Arc;
use std::time::Duration;

use moodmate_shared::PlanCatalog;

/// Static configuration for one deployment of the core.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub catalog: PlanCatalog,
    pub calendar: QuotaCalendar,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,
    /// Upper bound on one classifier call.
    pub upstream_timeout: Duration,
}

impl AccessConfig {
    pub fn new(catalog: PlanCatalog, webhook_secret: impl Into<String>) -> Self {
        Self {
            catalog,
            calendar: QuotaCalendar::default(),
            webhook_secret: webhook_secret.into(),
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

/// The assembled access core.
pub struct AccessService {
    pub catalog: PlanCatalog,
    pub subscriptions: Arc<SubscriptionService>,
    pub gate: Arc<AccessGate>,
    pub quota: QuotaLedger,
    pub rate_limiter: RateLimiter,
    pub webhooks: WebhookReconciler,
    pub analysis: AnalysisService,
}

impl AccessService {
    pub fn new(
        config: AccessConfig,
        stores: AccessStores,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn EmotionClassifier>,
        mood_log: Arc<dyn MoodLogSink>,
    ) -> Self {
        let subscriptions = Arc::new(SubscriptionService::new(
            stores.subscriptions.clone(),
            config.catalog.clone(),
            clock.clone(),
        ));
        let quota = QuotaLedger::new(stores.counters.clone(), clock.clone(), config.calendar);
        let rate_limiter = RateLimiter::new(stores.counters.clone(), clock.clone());
        let gate = Arc::new(AccessGate::new(
            subscriptions.clone(),
            config.catalog.clone(),
            rate_limiter.clone(),
            quota.clone(),
            clock.clone(),
        ));
        let webhooks = WebhookReconciler::new(
            config.webhook_secret,
            stores.webhook_events,
            subscriptions.clone(),
            config.catalog.clone(),
            clock.clone(),
        );
        let analysis = AnalysisService::new(
            gate.clone(),
            classifier,
            mood_log,
            clock,
            config.upstream_timeout,
        );

        Self {
            catalog: config.catalog,
            subscriptions,
            gate,
            quota,
            rate_limiter,
            webhooks,
            analysis,
        }
    }

    /// Core wired to in-memory stores; tests and single-process runs.
    pub fn new_in_memory(
        config: AccessConfig,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn EmotionClassifier>,
        mood_log: Arc<dyn MoodLogSink>,
    ) -> Self {
        Self::new(config, AccessStores::in_memory(), clock, classifier, mood_log)
    }
}
