//! Plans, checkout, and the payment webhook boundary

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use moodmate_access::{AccessError, CheckoutSession, WebhookEvent, WebhookOutcome};
use moodmate_shared::PlanSpec;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

pub const EVENT_ID_HEADER: &str = "x-event-id";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// List purchasable plans from the catalog.
pub async fn list_plans(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Json<Vec<PlanSpec>> {
    Json(state.access.catalog.plans().to_vec())
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: String,
}

/// Start a checkout; the reference goes to the payment provider.
pub async fn create_checkout(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = state
        .access
        .subscriptions
        .initiate_checkout(user, &request.plan_code)
        .await?;
    Ok(Json(session))
}

/// Payment provider webhook. Unauthenticated by design; the signature over
/// the raw body is the authentication gate.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event_id = headers
        .get(EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::Access(AccessError::MalformedPayload(format!(
                "missing {EVENT_ID_HEADER} header"
            )))
        })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Access(AccessError::WebhookSignatureInvalid))?;

    let event = WebhookEvent {
        event_id: event_id.to_string(),
        signature: signature.to_string(),
        payload: body.to_vec(),
        received_at: Utc::now(),
    };

    let outcome = state.access.webhooks.handle(&event).await?;
    let status = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::Duplicate => "duplicate",
    };
    Ok(Json(json!({ "status": status })))
}
