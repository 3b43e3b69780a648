//! Analysis orchestration
//!
//! Validates input, runs the admission gate, calls the external emotion
//! classifier under a timeout, and maps the label to advice and music
//! recommendation keys. The quota unit is spent on the admitted attempt:
//! a classifier timeout or a failed mood-log write never refunds it —
//! refunding on failure would let unbounded retries bypass the ceiling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodmate_shared::{PlanTier, UserId};
use serde::{Deserialize, Serialize};

use crate::advice::{self, EmotionLabel, ADVICE_REMINDER};
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::gate::{AccessGate, AdmissionDecision};

/// Raw classifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScore {
    pub label: String,
    pub confidence: f64,
}

/// External emotion-classification collaborator. Opaque and potentially
/// unavailable; the orchestrator bounds every call with a timeout.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> AccessResult<EmotionScore>;
}

/// Lightweight mood-log record handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct MoodLogEntry {
    pub user_id: UserId,
    pub label: String,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Mood-log persistence collaborator. Failures are non-fatal to the
/// analysis response.
#[async_trait]
pub trait MoodLogSink: Send + Sync {
    async fn append(&self, entry: MoodLogEntry) -> AccessResult<()>;
}

/// Structured result of one admitted analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub label: String,
    pub confidence: f64,
    pub advice: String,
    pub music_keys: Vec<String>,
    pub plan: PlanTier,
    pub remaining_today: u32,
    /// Set when `persist` was requested and the mood-log write failed.
    pub persistence_warning: Option<String>,
}

pub struct AnalysisService {
    gate: Arc<AccessGate>,
    classifier: Arc<dyn EmotionClassifier>,
    mood_log: Arc<dyn MoodLogSink>,
    clock: Arc<dyn Clock>,
    upstream_timeout: Duration,
}

impl AnalysisService {
    pub const MAX_TEXT_CHARS: usize = 1000;

    pub fn new(
        gate: Arc<AccessGate>,
        classifier: Arc<dyn EmotionClassifier>,
        mood_log: Arc<dyn MoodLogSink>,
        clock: Arc<dyn Clock>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            classifier,
            mood_log,
            clock,
            upstream_timeout,
        }
    }

    /// Analyze `text` for `user_id`, consuming one quota unit on admission.
    ///
    /// Input validation happens before admission, so an empty or oversized
    /// request never touches the ledger. Denials surface as `RateLimited`
    /// or `QuotaExceeded` and the classifier is not called.
    pub async fn analyze(
        &self,
        user_id: UserId,
        text: &str,
        persist: bool,
    ) -> AccessResult<AnalysisResult> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AccessError::EmptyInput);
        }
        if text.chars().count() > Self::MAX_TEXT_CHARS {
            return Err(AccessError::InputTooLong {
                max: Self::MAX_TEXT_CHARS,
            });
        }

        let (plan, remaining_today) = match self.gate.admit(user_id).await? {
            AdmissionDecision::Admitted {
                plan,
                remaining_today,
            } => (plan, remaining_today),
            AdmissionDecision::DeniedRateLimit { retry_after } => {
                return Err(AccessError::RateLimited { retry_after });
            }
            AdmissionDecision::DeniedQuota { retry_after, plan } => {
                return Err(AccessError::QuotaExceeded { retry_after, plan });
            }
        };

        // The reservation above is spent whatever happens next.
        let score = match tokio::time::timeout(self.upstream_timeout, self.classifier.classify(text))
            .await
        {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Emotion classifier failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    timeout_ms = self.upstream_timeout.as_millis() as u64,
                    "Emotion classifier timed out"
                );
                return Err(AccessError::UpstreamUnavailable(
                    "classifier timed out".to_string(),
                ));
            }
        };

        let label = EmotionLabel::parse(&score.label);
        let confidence = score.confidence.clamp(0.0, 1.0);
        let advice = format!("{} {}", advice::advice_for(label), ADVICE_REMINDER);
        let music_keys = advice::recommendation_keys(label)
            .iter()
            .map(|key| (*key).to_string())
            .collect();

        let mut persistence_warning = None;
        if persist {
            let entry = MoodLogEntry {
                user_id,
                label: label.as_str().to_string(),
                confidence,
                recorded_at: self.clock.now_utc(),
            };
            if let Err(e) = self.mood_log.append(entry).await {
                // Soft failure: the quota unit is already spent and the
                // analysis itself succeeded.
                tracing::warn!(user_id = %user_id, error = %e, "Mood log append failed");
                persistence_warning = Some("mood log entry could not be saved".to_string());
            }
        }

        Ok(AnalysisResult {
            label: label.as_str().to_string(),
            confidence,
            advice,
            music_keys,
            plan,
            remaining_today,
            persistence_warning,
        })
    }
}

/// HTTP classifier against a Hugging Face style inference endpoint.
pub struct HttpEmotionClassifier {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    label: String,
    score: f64,
}

impl HttpEmotionClassifier {
    pub fn new(
        base_url: &str,
        model: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> AccessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccessError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/{}", base_url.trim_end_matches('/'), model),
            api_token,
        })
    }

    fn top_score(body: serde_json::Value) -> Option<RawScore> {
        // The inference API answers either [[{label, score}, ..]] or
        // [{label, score}, ..] depending on the model pipeline.
        let scores: Vec<RawScore> =
            match serde_json::from_value::<Vec<Vec<RawScore>>>(body.clone()) {
                Ok(nested) => nested.into_iter().next().unwrap_or_default(),
                Err(_) => serde_json::from_value(body).ok()?,
            };
        scores
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    async fn classify(&self, text: &str) -> AccessResult<EmotionScore> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": text }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AccessError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AccessError::UpstreamUnavailable(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AccessError::UpstreamUnavailable(e.to_string()))?;

        let top = Self::top_score(body).ok_or_else(|| {
            AccessError::UpstreamUnavailable("unrecognized classifier response".to_string())
        })?;

        Ok(EmotionScore {
            label: top.label,
            confidence: top.score,
        })
    }
}

/// Bounded in-memory mood log. Stands in for the real persistence
/// collaborator in tests and single-process runs.
#[derive(Default)]
pub struct InMemoryMoodLog {
    entries: std::sync::Mutex<std::collections::VecDeque<MoodLogEntry>>,
}

impl InMemoryMoodLog {
    const CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MoodLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MoodLogSink for InMemoryMoodLog {
    async fn append(&self, entry: MoodLogEntry) -> AccessResult<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.len() >= Self::CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_classifier_parses_nested_inference_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emotion-english")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[[{"label": "JOY", "score": 0.91}, {"label": "sadness", "score": 0.04}]]"#,
            )
            .create_async()
            .await;

        let classifier = HttpEmotionClassifier::new(
            &server.url(),
            "emotion-english",
            Some("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let score = classifier.classify("what a day").await.unwrap();
        assert_eq!(score.label, "JOY");
        assert!((score.confidence - 0.91).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_classifier_maps_errors_to_upstream_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/emotion-english")
            .with_status(503)
            .create_async()
            .await;

        let classifier = HttpEmotionClassifier::new(
            &server.url(),
            "emotion-english",
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = classifier.classify("hello").await.unwrap_err();
        assert!(matches!(err, AccessError::UpstreamUnavailable(_)));
    }

    #[test]
    fn top_score_handles_flat_responses() {
        let body = serde_json::json!([
            {"label": "anger", "score": 0.2},
            {"label": "fear", "score": 0.7}
        ]);
        let top = HttpEmotionClassifier::top_score(body).unwrap();
        assert_eq!(top.label, "fear");
    }
}
