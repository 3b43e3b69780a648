// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Access Core
//!
//! Covers boundary conditions and race conditions in:
//! - Quota ledger (day boundaries, concurrent reservations)
//! - Rate limiter (bucket boundaries, independence from quota)
//! - Admission gate (plan changes mid-day)
//! - Subscription lifecycle (checkout idempotency, lazy expiry)
//! - Webhook reconciliation (idempotency, forged events, renewals)
//! - Analysis orchestration (input validation, upstream failures)

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moodmate_shared::{PlanCatalog, PlanTier, UserId};

use crate::analysis::{EmotionClassifier, EmotionScore, InMemoryMoodLog, MoodLogEntry, MoodLogSink};
use crate::clock::{Clock, ManualClock, QuotaCalendar};
use crate::error::{AccessError, AccessResult};
use crate::gate::AdmissionDecision;
use crate::quota::{QuotaLedger, Reservation};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::store::memory::InMemoryCounterStore;
use crate::subscriptions::SubscriptionStatus;
use crate::webhooks::{sign_payload, WebhookEvent, WebhookOutcome};
use crate::{AccessConfig, AccessService};

const SECRET: &str = "whsec_test_secret";

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid timestamp")
}

/// Mid-morning EAT, well clear of the midnight boundary.
fn mid_day_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(utc("2026-03-02T09:00:00Z")))
}

struct StubClassifier {
    label: &'static str,
    confidence: f64,
    delay: Option<StdDuration>,
    fail: bool,
}

impl StubClassifier {
    fn returning(label: &'static str, confidence: f64) -> Self {
        Self {
            label,
            confidence,
            delay: None,
            fail: false,
        }
    }

    fn slow(delay: StdDuration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning("joy", 0.9)
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning("joy", 0.9)
        }
    }
}

#[async_trait]
impl EmotionClassifier for StubClassifier {
    async fn classify(&self, _text: &str) -> AccessResult<EmotionScore> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AccessError::UpstreamUnavailable("stub outage".to_string()));
        }
        Ok(EmotionScore {
            label: self.label.to_string(),
            confidence: self.confidence,
        })
    }
}

struct FailingMoodLog;

#[async_trait]
impl MoodLogSink for FailingMoodLog {
    async fn append(&self, _entry: MoodLogEntry) -> AccessResult<()> {
        Err(AccessError::Storage("mood log store down".to_string()))
    }
}

fn service(clock: Arc<ManualClock>, classifier: StubClassifier) -> (AccessService, Arc<InMemoryMoodLog>) {
    let mood_log = Arc::new(InMemoryMoodLog::new());
    let config = AccessConfig::new(PlanCatalog::default(), SECRET);
    let svc = AccessService::new_in_memory(config, clock, Arc::new(classifier), mood_log.clone());
    (svc, mood_log)
}

fn success_event(id: &str, user: UserId, plan: &str) -> WebhookEvent {
    event(id, user, plan, "COMPLETE")
}

fn event(id: &str, user: UserId, plan: &str, status: &str) -> WebhookEvent {
    let payload = serde_json::json!({
        "plan_code": plan,
        "user_reference": user.0,
        "status": status,
    })
    .to_string()
    .into_bytes();
    WebhookEvent {
        event_id: id.to_string(),
        signature: sign_payload(SECRET, &payload),
        payload,
        received_at: Utc::now(),
    }
}

mod quota_tests {
    use super::*;
    use tokio::sync::Barrier;

    fn ledger(clock: Arc<ManualClock>) -> QuotaLedger {
        QuotaLedger::new(
            Arc::new(InMemoryCounterStore::new()),
            clock,
            QuotaCalendar::default(),
        )
    }

    // =========================================================================
    // Concurrent reservations never collectively exceed the ceiling
    // =========================================================================
    #[tokio::test]
    async fn concurrent_reservations_respect_ceiling() {
        let ledger = Arc::new(ledger(mid_day_clock()));
        let user = UserId::new();
        let barrier = Arc::new(Barrier::new(20));

        let mut handles = vec![];
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.try_reserve(user, 5).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Reservation::Admitted { .. }) {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5, "exactly the ceiling must be admitted");
        assert_eq!(ledger.peek(user).await.unwrap().consumed, 5);
    }

    // =========================================================================
    // 23:59:59 and 00:00:01 local belong to different counters
    // =========================================================================
    #[tokio::test]
    async fn crossing_local_midnight_resets_consumption() {
        // 20:59:59Z == 23:59:59 EAT
        let clock = Arc::new(ManualClock::new(utc("2026-03-01T20:59:59Z")));
        let ledger = ledger(clock.clone());
        let user = UserId::new();

        assert!(matches!(
            ledger.try_reserve(user, 5).await.unwrap(),
            Reservation::Admitted { .. }
        ));
        let before = ledger.peek(user).await.unwrap();
        assert_eq!(before.consumed, 1);
        assert_eq!(before.quota_day, "2026-03-01");

        clock.set(utc("2026-03-01T21:00:01Z")); // 00:00:01 EAT next day
        let after = ledger.peek(user).await.unwrap();
        assert_eq!(after.consumed, 0, "new day starts from a fresh counter");
        assert_eq!(after.quota_day, "2026-03-02");

        assert!(matches!(
            ledger.try_reserve(user, 5).await.unwrap(),
            Reservation::Admitted { remaining: 4 }
        ));
    }

    // =========================================================================
    // Denial carries the wait until the next local midnight
    // =========================================================================
    #[tokio::test]
    async fn denial_retry_after_points_at_next_reset() {
        // 18:00:00Z == 21:00:00 EAT, three hours to midnight
        let clock = Arc::new(ManualClock::new(utc("2026-03-01T18:00:00Z")));
        let ledger = ledger(clock);
        let user = UserId::new();

        ledger.try_reserve(user, 1).await.unwrap();
        match ledger.try_reserve(user, 1).await.unwrap() {
            Reservation::Denied { retry_after } => {
                assert_eq!(retry_after.as_secs(), 3 * 60 * 60);
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    // =========================================================================
    // peek never mutates
    // =========================================================================
    #[tokio::test]
    async fn peek_is_read_only() {
        let ledger = ledger(mid_day_clock());
        let user = UserId::new();
        for _ in 0..10 {
            ledger.peek(user).await.unwrap();
        }
        assert_eq!(ledger.peek(user).await.unwrap().consumed, 0);
    }
}

mod rate_limit_tests {
    use super::*;

    // =========================================================================
    // Exactly `limit` requests pass within one minute bucket
    // =========================================================================
    #[tokio::test]
    async fn denies_past_limit_with_bucket_remainder() {
        let clock = Arc::new(ManualClock::new(utc("2026-03-02T09:00:30Z")));
        let limiter = RateLimiter::new_in_memory(clock);
        let user = UserId::new();

        for _ in 0..3 {
            assert!(matches!(
                limiter.try_admit(user, 3).await.unwrap(),
                RateDecision::Admitted { .. }
            ));
        }
        match limiter.try_admit(user, 3).await.unwrap() {
            RateDecision::Denied { retry_after } => {
                assert_eq!(retry_after.as_secs(), 30, "half the bucket remains");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    // =========================================================================
    // The next minute bucket starts fresh
    // =========================================================================
    #[tokio::test]
    async fn new_minute_bucket_admits_again() {
        let clock = Arc::new(ManualClock::new(utc("2026-03-02T09:00:30Z")));
        let limiter = RateLimiter::new_in_memory(clock.clone());
        let user = UserId::new();

        limiter.try_admit(user, 1).await.unwrap();
        assert!(matches!(
            limiter.try_admit(user, 1).await.unwrap(),
            RateDecision::Denied { .. }
        ));

        clock.advance(Duration::seconds(31));
        assert!(matches!(
            limiter.try_admit(user, 1).await.unwrap(),
            RateDecision::Admitted { .. }
        ));
    }

    // =========================================================================
    // Buckets are isolated per user
    // =========================================================================
    #[tokio::test]
    async fn users_do_not_share_buckets() {
        let limiter = RateLimiter::new_in_memory(mid_day_clock());
        let (a, b) = (UserId::new(), UserId::new());

        limiter.try_admit(a, 1).await.unwrap();
        assert!(matches!(
            limiter.try_admit(a, 1).await.unwrap(),
            RateDecision::Denied { .. }
        ));
        assert!(matches!(
            limiter.try_admit(b, 1).await.unwrap(),
            RateDecision::Admitted { .. }
        ));
    }
}

mod gate_tests {
    use super::*;

    // =========================================================================
    // Free ceiling: five admissions, then a quota denial naming the plan
    // =========================================================================
    #[tokio::test]
    async fn free_user_is_cut_off_at_the_free_ceiling() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        for _ in 0..5 {
            assert!(matches!(
                svc.gate.admit(user).await.unwrap(),
                AdmissionDecision::Admitted {
                    plan: PlanTier::Free,
                    ..
                }
            ));
        }
        match svc.gate.admit(user).await.unwrap() {
            AdmissionDecision::DeniedQuota { plan, retry_after } => {
                assert_eq!(plan, PlanTier::Free);
                assert!(retry_after.as_secs() > 0);
            }
            other => panic!("expected quota denial, got {other:?}"),
        }
    }

    // =========================================================================
    // A mid-day upgrade raises the ceiling immediately; consumption carries
    // =========================================================================
    #[tokio::test]
    async fn upgrade_applies_to_the_next_reservation() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        for _ in 0..5 {
            svc.gate.admit(user).await.unwrap();
        }
        assert!(matches!(
            svc.gate.admit(user).await.unwrap(),
            AdmissionDecision::DeniedQuota { .. }
        ));

        svc.webhooks
            .handle(&success_event("evt_upgrade", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();

        match svc.gate.admit(user).await.unwrap() {
            AdmissionDecision::Admitted {
                plan,
                remaining_today,
            } => {
                assert_eq!(plan, PlanTier::Premium);
                // Five free-tier units already consumed carry over.
                assert_eq!(remaining_today, 200 - 6);
            }
            other => panic!("expected admission, got {other:?}"),
        }
    }

    // =========================================================================
    // Rate denial happens before, and independently of, quota consumption
    // =========================================================================
    #[tokio::test]
    async fn rate_denial_does_not_touch_the_ledger() {
        let clock = mid_day_clock();
        let catalog = PlanCatalog::with_ceilings(5, 200, 2);
        let config = AccessConfig::new(catalog, SECRET);
        let svc = AccessService::new_in_memory(
            config,
            clock,
            Arc::new(StubClassifier::returning("joy", 0.9)),
            Arc::new(InMemoryMoodLog::new()),
        );
        let user = UserId::new();

        for _ in 0..2 {
            assert!(matches!(
                svc.gate.admit(user).await.unwrap(),
                AdmissionDecision::Admitted { .. }
            ));
        }
        assert!(matches!(
            svc.gate.admit(user).await.unwrap(),
            AdmissionDecision::DeniedRateLimit { .. }
        ));
        assert_eq!(
            svc.quota.peek(user).await.unwrap().consumed,
            2,
            "the throttled request must not consume daily quota"
        );
    }
}

mod subscription_tests {
    use super::*;

    // =========================================================================
    // Re-initiating the same plan reuses the outstanding checkout
    // =========================================================================
    #[tokio::test]
    async fn checkout_is_idempotent_per_outstanding_plan() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        let first = svc
            .subscriptions
            .initiate_checkout(user, "PREMIUM_MONTHLY")
            .await
            .unwrap();
        let second = svc
            .subscriptions
            .initiate_checkout(user, "PREMIUM_MONTHLY")
            .await
            .unwrap();
        assert_eq!(first.reference, second.reference);
        assert_eq!(first.amount_kes, 499);

        // A different plan supersedes the pending checkout.
        let yearly = svc
            .subscriptions
            .initiate_checkout(user, "PREMIUM_YEARLY")
            .await
            .unwrap();
        assert_ne!(yearly.reference, first.reference);
        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.plan_code, "PREMIUM_YEARLY");
        assert_eq!(sub.status, SubscriptionStatus::PendingPayment);
    }

    // =========================================================================
    // Unknown and free plans cannot start a checkout
    // =========================================================================
    #[tokio::test]
    async fn checkout_rejects_unknown_and_free_plans() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        assert!(matches!(
            svc.subscriptions.initiate_checkout(user, "GOLD").await,
            Err(AccessError::PlanNotFound(_))
        ));
        assert!(matches!(
            svc.subscriptions.initiate_checkout(user, "FREE").await,
            Err(AccessError::PlanNotPurchasable(_))
        ));
    }

    // =========================================================================
    // An active subscription is never demoted by a renewal checkout
    // =========================================================================
    #[tokio::test]
    async fn renewal_checkout_keeps_active_entitlement() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        svc.webhooks
            .handle(&success_event("evt_1", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();
        svc.subscriptions
            .initiate_checkout(user, "PREMIUM_YEARLY")
            .await
            .unwrap();

        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.checkout_ref.is_some());
    }

    // =========================================================================
    // Lapsed subscriptions expire lazily at resolution time
    // =========================================================================
    #[tokio::test]
    async fn snapshot_expires_lapsed_subscriptions() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        svc.webhooks
            .handle(&success_event("evt_1", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();

        clock.advance(Duration::days(31));
        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);

        // And the entitlement drops back to free ceilings.
        let status = svc.gate.usage(user).await.unwrap();
        assert_eq!(status.plan, PlanTier::Free);
        assert_eq!(status.daily_quota, 5);
    }

    // =========================================================================
    // expire is a typed failure outside Active-and-lapsed
    // =========================================================================
    #[tokio::test]
    async fn expire_rejects_illegal_predecessors() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        assert!(matches!(
            svc.subscriptions.expire(user).await,
            Err(AccessError::InvalidTransition { .. })
        ));

        svc.subscriptions
            .initiate_checkout(user, "PREMIUM_MONTHLY")
            .await
            .unwrap();
        assert!(matches!(
            svc.subscriptions.expire(user).await,
            Err(AccessError::InvalidTransition { .. })
        ));
    }

    // =========================================================================
    // The sweep expires exactly the lapsed records
    // =========================================================================
    #[tokio::test]
    async fn expire_overdue_sweeps_lapsed_records() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let (lapsing, fresh) = (UserId::new(), UserId::new());

        svc.webhooks
            .handle(&success_event("evt_a", lapsing, "PREMIUM_MONTHLY"))
            .await
            .unwrap();
        clock.advance(Duration::days(31));
        svc.webhooks
            .handle(&success_event("evt_b", fresh, "PREMIUM_MONTHLY"))
            .await
            .unwrap();

        assert_eq!(svc.subscriptions.expire_overdue().await.unwrap(), 1);
        assert_eq!(
            svc.subscriptions
                .snapshot(fresh)
                .await
                .unwrap()
                .unwrap()
                .status,
            SubscriptionStatus::Active
        );
    }
}

mod webhook_tests {
    use super::*;

    // =========================================================================
    // Same event id: Applied, then Duplicate, identical end state
    // =========================================================================
    #[tokio::test]
    async fn redelivery_is_a_no_op() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();
        let evt = success_event("evt_1", user, "PREMIUM_MONTHLY");

        assert_eq!(svc.webhooks.handle(&evt).await.unwrap(), WebhookOutcome::Applied);
        let after_first = svc.subscriptions.snapshot(user).await.unwrap();

        assert_eq!(
            svc.webhooks.handle(&evt).await.unwrap(),
            WebhookOutcome::Duplicate
        );
        let after_second = svc.subscriptions.snapshot(user).await.unwrap();
        assert_eq!(after_first, after_second);
    }

    // =========================================================================
    // A forged event never changes subscription state
    // =========================================================================
    #[tokio::test]
    async fn forged_signature_is_rejected_before_any_effect() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        let mut forged = success_event("evt_evil", user, "PREMIUM_MONTHLY");
        forged.signature = sign_payload("wrong_secret", &forged.payload);

        let before = svc.subscriptions.snapshot(user).await.unwrap();
        assert!(matches!(
            svc.webhooks.handle(&forged).await,
            Err(AccessError::WebhookSignatureInvalid)
        ));
        assert_eq!(before, svc.subscriptions.snapshot(user).await.unwrap());

        // Same event id delivered later with a genuine signature must still
        // apply: the forgery may not poison the seen-set.
        let genuine = success_event("evt_evil", user, "PREMIUM_MONTHLY");
        assert_eq!(
            svc.webhooks.handle(&genuine).await.unwrap(),
            WebhookOutcome::Applied
        );
    }

    // =========================================================================
    // Malformed payloads are rejected without state changes
    // =========================================================================
    #[tokio::test]
    async fn malformed_payloads_are_rejected() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));

        let payload = br#"{"plan_code": "PREMIUM_MONTHLY"}"#.to_vec();
        let evt = WebhookEvent {
            event_id: "evt_bad".to_string(),
            signature: sign_payload(SECRET, &payload),
            payload,
            received_at: Utc::now(),
        };
        assert!(matches!(
            svc.webhooks.handle(&evt).await,
            Err(AccessError::MalformedPayload(_))
        ));

        let (svc2, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let unknown_plan = success_event("evt_plan", UserId::new(), "GOLD");
        assert!(matches!(
            svc2.webhooks.handle(&unknown_plan).await,
            Err(AccessError::MalformedPayload(_))
        ));
    }

    // =========================================================================
    // Renewal success extends the current paid period
    // =========================================================================
    #[tokio::test]
    async fn renewal_extends_from_current_expiry() {
        let clock = mid_day_clock();
        let start = clock.now_utc();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        svc.webhooks
            .handle(&success_event("evt_1", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();
        svc.webhooks
            .handle(&success_event("evt_2", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();

        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.expires_at, Some(start + Duration::days(60)));
    }

    // =========================================================================
    // Failure events are recorded, never dropped
    // =========================================================================
    #[tokio::test]
    async fn failure_events_are_applied_without_upgrading() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        svc.subscriptions
            .initiate_checkout(user, "PREMIUM_MONTHLY")
            .await
            .unwrap();
        assert_eq!(
            svc.webhooks
                .handle(&event("evt_fail", user, "PREMIUM_MONTHLY", "FAILED"))
                .await
                .unwrap(),
            WebhookOutcome::Applied
        );

        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PendingPayment);
    }

    // =========================================================================
    // A renewal failure after the period lapsed expires the record
    // =========================================================================
    #[tokio::test]
    async fn lapsed_renewal_failure_expires() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        svc.webhooks
            .handle(&success_event("evt_1", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();
        clock.advance(Duration::days(31));

        svc.webhooks
            .handle(&event("evt_2", user, "PREMIUM_MONTHLY", "CANCELLED"))
            .await
            .unwrap();
        let sub = svc.subscriptions.snapshot(user).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    // =========================================================================
    // Unrecognized states apply as a recorded no-op
    // =========================================================================
    #[tokio::test]
    async fn unrecognized_status_leaves_state_untouched() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        let before = svc.subscriptions.snapshot(user).await.unwrap();
        assert_eq!(
            svc.webhooks
                .handle(&event("evt_p", user, "PREMIUM_MONTHLY", "PROCESSING"))
                .await
                .unwrap(),
            WebhookOutcome::Applied
        );
        assert_eq!(before, svc.subscriptions.snapshot(user).await.unwrap());
    }
}

mod analysis_tests {
    use super::*;

    // =========================================================================
    // Blank input fails without touching the ledger
    // =========================================================================
    #[tokio::test]
    async fn empty_input_never_reaches_the_ledger() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        assert!(matches!(
            svc.analysis.analyze(user, "   \n\t ", false).await,
            Err(AccessError::EmptyInput)
        ));
        assert_eq!(svc.quota.peek(user).await.unwrap().consumed, 0);
    }

    #[tokio::test]
    async fn oversized_input_is_rejected() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();
        let text = "a".repeat(1001);

        assert!(matches!(
            svc.analysis.analyze(user, &text, false).await,
            Err(AccessError::InputTooLong { max: 1000 })
        ));
        assert_eq!(svc.quota.peek(user).await.unwrap().consumed, 0);
    }

    // =========================================================================
    // Admitted analysis: label normalization, advice, recommendations
    // =========================================================================
    #[tokio::test]
    async fn admitted_analysis_returns_structured_result() {
        let (svc, mood_log) = service(mid_day_clock(), StubClassifier::returning("GRIEF", 1.7));
        let user = UserId::new();

        let result = svc
            .analysis
            .analyze(user, "today was heavy", true)
            .await
            .unwrap();

        assert_eq!(result.label, "sadness", "synonyms collapse onto the closed set");
        assert_eq!(result.confidence, 1.0, "confidence is clamped into [0,1]");
        assert!(result.advice.contains("general wellness advice"));
        assert_eq!(result.music_keys, ["sad-songs", "melancholy-indie"]);
        assert_eq!(result.plan, PlanTier::Free);
        assert_eq!(result.remaining_today, 4);
        assert!(result.persistence_warning.is_none());
        assert_eq!(mood_log.entries().len(), 1);
        assert_eq!(mood_log.entries()[0].label, "sadness");
    }

    // =========================================================================
    // Upstream timeout: the reserved unit is spent, not refunded
    // =========================================================================
    #[tokio::test]
    async fn classifier_timeout_spends_the_quota_unit() {
        let clock = mid_day_clock();
        let mut config = AccessConfig::new(PlanCatalog::default(), SECRET);
        config.upstream_timeout = StdDuration::from_millis(20);
        let svc = AccessService::new_in_memory(
            config,
            clock,
            Arc::new(StubClassifier::slow(StdDuration::from_millis(500))),
            Arc::new(InMemoryMoodLog::new()),
        );
        let user = UserId::new();

        assert!(matches!(
            svc.analysis.analyze(user, "slow day", false).await,
            Err(AccessError::UpstreamUnavailable(_))
        ));
        assert_eq!(
            svc.quota.peek(user).await.unwrap().consumed,
            1,
            "quota is consumed by admitted attempts"
        );
    }

    #[tokio::test]
    async fn classifier_error_spends_the_quota_unit() {
        let (svc, _) = service(mid_day_clock(), StubClassifier::failing());
        let user = UserId::new();

        assert!(matches!(
            svc.analysis.analyze(user, "hello", false).await,
            Err(AccessError::UpstreamUnavailable(_))
        ));
        assert_eq!(svc.quota.peek(user).await.unwrap().consumed, 1);
    }

    // =========================================================================
    // Mood-log failure is a soft warning, not a hard failure
    // =========================================================================
    #[tokio::test]
    async fn persistence_failure_is_soft() {
        let config = AccessConfig::new(PlanCatalog::default(), SECRET);
        let svc = AccessService::new_in_memory(
            config,
            mid_day_clock(),
            Arc::new(StubClassifier::returning("joy", 0.9)),
            Arc::new(FailingMoodLog),
        );
        let user = UserId::new();

        let result = svc.analysis.analyze(user, "fine day", true).await.unwrap();
        assert!(result.persistence_warning.is_some());
        assert_eq!(svc.quota.peek(user).await.unwrap().consumed, 1);
    }

    // =========================================================================
    // End to end: free ceiling, upgrade, immediate premium ceiling
    // =========================================================================
    #[tokio::test]
    async fn free_user_upgrade_scenario() {
        let clock = mid_day_clock();
        let (svc, _) = service(clock.clone(), StubClassifier::returning("joy", 0.9));
        let user = UserId::new();

        for i in 0..5 {
            let result = svc.analysis.analyze(user, "a fine day", false).await;
            assert!(result.is_ok(), "request {i} should be admitted");
        }

        match svc.analysis.analyze(user, "one more", false).await {
            Err(AccessError::QuotaExceeded { plan, retry_after }) => {
                assert_eq!(plan, PlanTier::Free);
                assert!(retry_after.as_secs() > 0);
            }
            other => panic!("expected quota denial, got {other:?}"),
        }

        svc.webhooks
            .handle(&success_event("evt_up", user, "PREMIUM_MONTHLY"))
            .await
            .unwrap();

        let result = svc.analysis.analyze(user, "premium now", false).await.unwrap();
        assert_eq!(result.plan, PlanTier::Premium);
        assert_eq!(result.remaining_today, 200 - 6);
    }
}
