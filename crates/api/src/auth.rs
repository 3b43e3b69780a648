//! Caller identity
//!
//! Identity verification is owned by the upstream gateway, which strips any
//! client-supplied `x-user-id` and injects the verified one. This extractor
//! trusts that header completely and performs no further authentication.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use moodmate_shared::UserId;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified caller identity for the current request.
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let id = raw
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthenticated)?;
        Ok(AuthenticatedUser(UserId::from(id)))
    }
}
