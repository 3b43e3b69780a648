//! HTTP routes

pub mod ai;
pub mod payments;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ai/analyze", post(ai::analyze))
        .route("/api/v1/ai/recommendations", get(ai::recommendations))
        .route("/api/v1/ai/quota", get(ai::quota))
        .route("/api/v1/payments/plans", get(payments::list_plans))
        .route("/api/v1/payments/checkout", post(payments::create_checkout))
        .route("/api/v1/payments/webhook", post(payments::webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
