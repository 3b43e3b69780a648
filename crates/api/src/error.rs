//! API error mapping
//!
//! Core errors map onto client-visible status codes and retry hints. Quota
//! exhaustion keeps 402 Payment Required so clients can render the upsell;
//! throttling is 429 with a Retry-After header in whole seconds.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use moodmate_access::AccessError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Access(AccessError),
    Unauthenticated,
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError::Access(err)
    }
}

/// Whole seconds, rounded up, for the Retry-After header.
fn retry_after_secs(duration: std::time::Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn with_retry_after(status: StatusCode, secs: u64, body: serde_json::Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "Valid x-user-id header is required" })),
            )
                .into_response(),

            ApiError::Access(err) => match err {
                AccessError::RateLimited { retry_after } => {
                    let secs = retry_after_secs(retry_after);
                    with_retry_after(
                        StatusCode::TOO_MANY_REQUESTS,
                        secs,
                        json!({
                            "detail": "Too many requests. Please slow down.",
                            "retry_after_seconds": secs,
                        }),
                    )
                }
                AccessError::QuotaExceeded { retry_after, plan } => {
                    let secs = retry_after_secs(retry_after);
                    with_retry_after(
                        StatusCode::PAYMENT_REQUIRED,
                        secs,
                        json!({
                            "detail": "Daily AI limit reached. Upgrade to Premium for more calls.",
                            "plan": plan.to_string(),
                            "retry_after_seconds": secs,
                        }),
                    )
                }
                AccessError::EmptyInput | AccessError::InputTooLong { .. } => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response(),
                AccessError::MalformedPayload(_) | AccessError::PlanNotPurchasable(_) => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response(),
                AccessError::WebhookSignatureInvalid => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response(),
                AccessError::PlanNotFound(_) => (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response(),
                AccessError::InvalidTransition { .. } => (
                    StatusCode::CONFLICT,
                    Json(json!({ "detail": err.to_string() })),
                )
                    .into_response(),
                AccessError::UpstreamUnavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "detail": "An error occurred during analysis. Please try again.",
                        "ai_unavailable": true,
                    })),
                )
                    .into_response(),
                AccessError::Storage(ref detail) => {
                    tracing::error!(error = %detail, "Storage failure serving request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "detail": "Internal server error" })),
                    )
                        .into_response()
                }
            },
        }
    }
}
