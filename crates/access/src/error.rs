//! Error types for the access core

use std::time::Duration;

use moodmate_shared::PlanTier;
use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

/// Errors surfaced by the access core.
///
/// Admission denials (`RateLimited`, `QuotaExceeded`) carry the wait until
/// the relevant window resets so callers can render a precise retry hint.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("daily AI limit reached on the {plan} plan")]
    QuotaExceeded {
        retry_after: Duration,
        plan: PlanTier,
    },

    #[error("text is required for analysis")]
    EmptyInput,

    #[error("text cannot exceed {max} characters")]
    InputTooLong { max: usize },

    #[error("emotion classifier unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("plan {0} cannot be purchased")]
    PlanNotPurchasable(String),

    #[error("illegal subscription transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for AccessError {
    fn from(err: sqlx::Error) -> Self {
        AccessError::Storage(err.to_string())
    }
}

impl From<redis::RedisError> for AccessError {
    fn from(err: redis::RedisError) -> Self {
        AccessError::Storage(err.to_string())
    }
}
