//! Server configuration

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// When unset the server runs on in-memory stores (single-process only).
    pub database_url: Option<String>,
    /// Optional external counter store for multi-process deployments.
    pub redis_url: Option<String>,
    /// Shared secret for payment webhook signatures.
    pub webhook_secret: String,
    pub classifier_base_url: String,
    pub classifier_model: String,
    pub classifier_api_token: Option<String>,
    pub classifier_timeout_secs: u64,
    /// Quota-day timezone as a whole-hour UTC offset.
    pub utc_offset_hours: i32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let webhook_secret = std::env::var("PAYMENT_WEBHOOK_SECRET")
            .context("PAYMENT_WEBHOOK_SECRET must be set")?;

        let classifier_api_token = std::env::var("HUGGINGFACE_API_TOKEN").ok();
        if classifier_api_token.is_none() {
            tracing::warn!("HUGGINGFACE_API_TOKEN not set - classifier calls will be anonymous");
        }

        Ok(Self {
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8000"),
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            webhook_secret,
            classifier_base_url: env_or(
                "CLASSIFIER_BASE_URL",
                "https://api-inference.huggingface.co/models",
            ),
            classifier_model: env_or(
                "EMOTION_MODEL",
                "j-hartmann/emotion-english-distilroberta-base",
            ),
            classifier_api_token,
            classifier_timeout_secs: std::env::var("CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            utc_offset_hours: std::env::var("QUOTA_UTC_OFFSET_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
