//! Application state

use std::sync::Arc;
use std::time::Duration;

use moodmate_access::store::redis::RedisCounterStore;
use moodmate_access::{
    AccessConfig, AccessService, AccessStores, Clock, HttpEmotionClassifier, InMemoryMoodLog,
    QuotaCalendar, SystemClock,
};
use moodmate_shared::PlanCatalog;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub access: Arc<AccessService>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let stores = Self::build_stores(&config).await?;

        let catalog = PlanCatalog::from_env();
        let calendar =
            QuotaCalendar::from_offset_hours(config.utc_offset_hours).unwrap_or_default();
        let access_config = AccessConfig {
            catalog,
            calendar,
            webhook_secret: config.webhook_secret.clone(),
            upstream_timeout: Duration::from_secs(config.classifier_timeout_secs),
        };

        let classifier = HttpEmotionClassifier::new(
            &config.classifier_base_url,
            &config.classifier_model,
            config.classifier_api_token.clone(),
            access_config.upstream_timeout,
        )?;

        // Mood-log content is owned by the mood service; this process only
        // keeps the lightweight analysis trail.
        let mood_log = Arc::new(InMemoryMoodLog::new());

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let access = AccessService::new(
            access_config,
            stores,
            clock,
            Arc::new(classifier),
            mood_log,
        );

        Ok(Self {
            access: Arc::new(access),
            config,
        })
    }

    async fn build_stores(config: &Config) -> anyhow::Result<AccessStores> {
        let Some(database_url) = &config.database_url else {
            tracing::warn!(
                "DATABASE_URL not set - running on in-memory stores (single-process only)"
            );
            return Ok(AccessStores::in_memory());
        };

        let pool = moodmate_shared::create_pool(database_url).await?;
        let mut stores = AccessStores::postgres(pool);
        tracing::info!("PostgreSQL-backed stores initialized");

        if let Some(redis_url) = &config.redis_url {
            match RedisCounterStore::connect(redis_url).await {
                Ok(counters) => {
                    stores.counters = Arc::new(counters);
                    tracing::info!("Counter store moved to Redis");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis not reachable - counters stay on PostgreSQL");
                }
            }
        }

        Ok(stores)
    }
}
