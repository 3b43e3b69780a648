//! AI analysis routes

use axum::extract::{Query, State};
use axum::Json;
use moodmate_access::advice;
use moodmate_access::{AnalysisResult, QuotaStatus, DISCLAIMER};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
pub struct EmotionBody {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub emotion: EmotionBody,
    pub advice: String,
    pub music_keys: Vec<String>,
    pub plan: String,
    pub remaining_today: u32,
    pub disclaimer: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<AnalysisResult> for AnalyzeResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            emotion: EmotionBody {
                label: result.label,
                score: result.confidence,
            },
            advice: result.advice,
            music_keys: result.music_keys,
            plan: result.plan.to_string(),
            remaining_today: result.remaining_today,
            disclaimer: DISCLAIMER,
            warning: result.persistence_warning,
        }
    }
}

/// Analyze emotion in text, consuming one quota unit on admission.
pub async fn analyze(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let result = state
        .access
        .analysis
        .analyze(user, &request.text, request.persist)
        .await?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub mood: String,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub mood: String,
    pub music_keys: Vec<String>,
}

/// Curated playlist keys for a mood, no quota consumed.
pub async fn recommendations(
    _user: AuthenticatedUser,
    Query(query): Query<RecommendationsQuery>,
) -> Json<RecommendationsResponse> {
    let music_keys = advice::mood_keys(&query.mood)
        .iter()
        .map(|key| (*key).to_string())
        .collect();
    Json(RecommendationsResponse {
        mood: query.mood,
        music_keys,
    })
}

/// Current quota standing; read-only.
pub async fn quota(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<QuotaStatus>, ApiError> {
    Ok(Json(state.access.gate.usage(user).await?))
}
