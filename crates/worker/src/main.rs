//! MoodMate Background Worker
//!
//! Scheduled maintenance over the shared stores:
//! - Subscription expiry sweep (every 15 minutes) — an optimization over
//!   lazy expiry with identical observable semantics
//! - Quota counter retention purge (daily, just past local midnight)
//! - Stale rate-bucket sweep (hourly)
//! - Heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use moodmate_access::store::AccessStores;
use moodmate_access::{
    Clock, QuotaCalendar, QuotaLedger, RateLimiter, SubscriptionService, SystemClock,
};
use moodmate_shared::PlanCatalog;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting MoodMate Worker");

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        // Nothing durable to sweep without a database; stay alive so the
        // deployment stays green.
        warn!("DATABASE_URL not set - running in minimal mode");
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            info!("Worker heartbeat (minimal mode)");
        }
    };

    let pool = moodmate_shared::create_pool(&database_url).await?;
    let stores = AccessStores::postgres(pool);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = PlanCatalog::from_env();
    let calendar = std::env::var("QUOTA_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .and_then(QuotaCalendar::from_offset_hours)
        .unwrap_or_default();

    let subscriptions = Arc::new(SubscriptionService::new(
        stores.subscriptions.clone(),
        catalog,
        clock.clone(),
    ));
    let ledger = QuotaLedger::new(stores.counters.clone(), clock.clone(), calendar);
    let rate_limiter = RateLimiter::new(stores.counters.clone(), clock.clone());

    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription expiry sweep (every 15 minutes)
    let sweep_subscriptions = subscriptions.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let subscriptions = sweep_subscriptions.clone();
            Box::pin(async move {
                match subscriptions.expire_overdue().await {
                    Ok(expired) => info!(expired = expired, "Subscription expiry sweep complete"),
                    Err(e) => error!(error = %e, "Subscription expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: subscription expiry sweep (every 15 minutes)");

    // Job 2: Quota counter retention purge (daily at 21:30 UTC, shortly
    // after local midnight in the default quota timezone)
    let purge_ledger = ledger.clone();
    let purge_clock = clock.clone();
    scheduler
        .add(Job::new_async("0 30 21 * * *", move |_uuid, _l| {
            let ledger = purge_ledger.clone();
            let clock = purge_clock.clone();
            Box::pin(async move {
                let cutoff = clock.now_utc()
                    - chrono::Duration::days(QuotaLedger::RETENTION_DAYS);
                let quota_day = ledger.calendar().quota_day_key(cutoff);
                match ledger.purge_day(&quota_day).await {
                    Ok(removed) => {
                        info!(quota_day = %quota_day, removed = removed, "Quota purge complete")
                    }
                    Err(e) => error!(quota_day = %quota_day, error = %e, "Quota purge failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: quota counter purge (daily at 21:30 UTC)");

    // Job 3: Stale rate-bucket sweep (hourly)
    let sweep_limiter = rate_limiter.clone();
    scheduler
        .add(Job::new_async("0 5 * * * *", move |_uuid, _l| {
            let limiter = sweep_limiter.clone();
            Box::pin(async move {
                match limiter.purge_stale().await {
                    Ok(removed) => info!(removed = removed, "Rate-bucket sweep complete"),
                    Err(e) => error!(error = %e, "Rate-bucket sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: rate-bucket sweep (hourly)");

    // Job 4: Heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("MoodMate Worker started successfully with 4 scheduled jobs");

    // Keep the main task running; the scheduler runs jobs in background
    // tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
