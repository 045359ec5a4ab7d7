use photobooth_tracker::{
    config::AppConfig,
    db,
    services::{
        clock::SystemClock,
        poller::StatusPoller,
        registry::JobRegistry,
        results::PgResultFetcher,
        scheduler::PollScheduler,
        status::StatusClient,
        store::{JobStore, RedisSlot},
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const IDLE_CHECK_INTERVAL_MS: u64 = 1000;

/// Resume every persisted job and poll until none is left processing.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting transformation tracker worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let slot = RedisSlot::new(&config.redis_url).expect("Failed to initialize Redis client");
    let store = JobStore::new(Arc::new(slot), config.job_slot_key.clone());

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let status_client = StatusClient::new(
        &config.status_base_url,
        &config.status_api_key,
        config.status_timeout(),
    )
    .expect("Failed to initialize status client");

    let registry = Arc::new(JobRegistry::open(store, Arc::new(SystemClock)).await);
    let poller = Arc::new(StatusPoller::new(
        Arc::clone(&registry),
        Arc::new(status_client),
        Arc::new(PgResultFetcher::new(db_pool)),
        config.max_job_age(),
    ));
    let scheduler = PollScheduler::new(poller, config.poll_interval());

    let resumed = scheduler.resume_open_jobs(&registry).await;
    tracing::info!(resumed, "Worker ready");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping");
                break;
            }
            _ = sleep(Duration::from_millis(IDLE_CHECK_INTERVAL_MS)) => {}
        }

        if scheduler.scheduled_jobs().is_empty() {
            tracing::info!("No open jobs left");
            break;
        }
    }

    scheduler.shutdown();

    for job in registry.list().await {
        tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            progress = job.progress,
            "Final job state"
        );
    }
}
