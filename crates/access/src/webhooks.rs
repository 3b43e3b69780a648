//! Payment webhook reconciliation
//!
//! The webhook endpoint is otherwise unauthenticated, so the HMAC-SHA256
//! signature over the raw payload is the single authentication gate at this
//! boundary. Events are deduplicated by `event_id` through a durable
//! seen-set: claim, apply the state transition, then commit the id — a
//! failure releases the claim so re-delivery retries, and a forged or
//! malformed event never mutates subscription state. Handling may run
//! concurrently across event ids but serializes per user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use moodmate_shared::{PlanCatalog, PlanSpec, UserId};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::locks::UserLocks;
use crate::store::{EventClaim, WebhookStore};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// One delivery from the payment provider.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider-unique event id; the deduplication key.
    pub event_id: String,
    /// Hex HMAC-SHA256 of `payload` under the shared secret.
    pub signature: String,
    /// Raw payload bytes exactly as delivered.
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Outcome of handling a delivery. `Duplicate` is a successful no-op, not
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
}

#[derive(Debug, Deserialize)]
struct PaymentEventPayload {
    plan_code: String,
    user_reference: Uuid,
    status: String,
}

enum PaymentState {
    Succeeded,
    Failed,
    /// Anything else (processing, pending, ...): recorded, no transition.
    Pending,
}

fn parse_state(raw: &str) -> PaymentState {
    match raw.to_ascii_uppercase().as_str() {
        "COMPLETE" | "COMPLETED" | "SUCCESS" => PaymentState::Succeeded,
        "FAILED" | "CANCELLED" | "EXPIRED" => PaymentState::Failed,
        _ => PaymentState::Pending,
    }
}

pub struct WebhookReconciler {
    secret: String,
    store: Arc<dyn WebhookStore>,
    subscriptions: Arc<SubscriptionService>,
    catalog: PlanCatalog,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl WebhookReconciler {
    pub fn new(
        secret: String,
        store: Arc<dyn WebhookStore>,
        subscriptions: Arc<SubscriptionService>,
        catalog: PlanCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret,
            store,
            subscriptions,
            catalog,
            clock,
            locks: UserLocks::new(),
        }
    }

    /// Verify the delivery signature with a constant-time comparison.
    fn verify_signature(&self, event: &WebhookEvent) -> AccessResult<()> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AccessError::WebhookSignatureInvalid)?;
        mac.update(&event.payload);
        let expected = mac.finalize().into_bytes();

        let provided =
            hex::decode(event.signature.trim()).map_err(|_| AccessError::WebhookSignatureInvalid)?;
        if expected.ct_eq(provided.as_slice()).into() {
            Ok(())
        } else {
            Err(AccessError::WebhookSignatureInvalid)
        }
    }

    /// Handle one delivery. Safe to invoke arbitrarily many times for the
    /// same `event_id`.
    pub async fn handle(&self, event: &WebhookEvent) -> AccessResult<WebhookOutcome> {
        if let Err(e) = self.verify_signature(event) {
            tracing::warn!(
                event_id = %event.event_id,
                "Webhook signature verification failed"
            );
            return Err(e);
        }

        let payload: PaymentEventPayload = serde_json::from_slice(&event.payload)
            .map_err(|e| AccessError::MalformedPayload(e.to_string()))?;
        let spec = self
            .catalog
            .get(&payload.plan_code)
            .ok_or_else(|| {
                AccessError::MalformedPayload(format!("unknown plan code {}", payload.plan_code))
            })?
            .clone();

        match self
            .store
            .try_claim(&event.event_id, self.clock.now_utc())
            .await?
        {
            EventClaim::Claimed => {}
            EventClaim::AlreadyApplied | EventClaim::InFlight => {
                tracing::info!(event_id = %event.event_id, "Duplicate webhook event");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        match self.apply(&payload, &spec).await {
            Ok(()) => {
                // Committed only after the transition, so a crash in
                // between re-delivers instead of losing the update.
                self.store.mark_applied(&event.event_id).await?;
                tracing::info!(
                    event_id = %event.event_id,
                    user_reference = %payload.user_reference,
                    plan_code = %spec.code,
                    "Webhook event applied"
                );
                Ok(WebhookOutcome::Applied)
            }
            Err(e) => {
                if let Err(release_err) = self.store.release(&event.event_id).await {
                    tracing::error!(
                        event_id = %event.event_id,
                        error = %release_err,
                        "Failed to release webhook claim after apply error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, payload: &PaymentEventPayload, spec: &PlanSpec) -> AccessResult<()> {
        let user_id = UserId::from(payload.user_reference);

        // Serialize per user_reference across concurrent deliveries.
        let lock = self.locks.handle(user_id);
        let _guard = lock.lock().await;

        match parse_state(&payload.status) {
            PaymentState::Succeeded => {
                let now = self.clock.now_utc();
                // Renewal extends the current paid period; a fresh or
                // lapsed subscription starts its period now.
                let base = self
                    .subscriptions
                    .snapshot(user_id)
                    .await?
                    .filter(|sub| sub.has_active_period(now))
                    .and_then(|sub| sub.expires_at)
                    .map_or(now, |at| at.max(now));
                let period_end = base + spec.duration();
                self.subscriptions
                    .confirm_payment(user_id, &spec.code, period_end)
                    .await?;
            }
            PaymentState::Failed => {
                self.subscriptions.record_payment_failure(user_id).await?;
            }
            PaymentState::Pending => {
                tracing::info!(
                    user_reference = %payload.user_reference,
                    status = %payload.status,
                    "Webhook status leaves subscription unchanged"
                );
            }
        }
        Ok(())
    }
}

/// Compute the hex signature for `payload`. Shared with tests and local
/// tooling that emits synthetic deliveries.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => String::new(),
    }
}
