use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photobooth_tracker::{
    app_state::AppState,
    config::AppConfig,
    db,
    routes,
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

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing photobooth-tracker server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!("Connecting to Redis job slot");
    let slot = RedisSlot::new(&config.redis_url).expect("Failed to initialize Redis client");
    let store = JobStore::new(Arc::new(slot), config.job_slot_key.clone());

    tracing::info!("Connecting to result table");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let status_client = StatusClient::new(
        &config.status_base_url,
        &config.status_api_key,
        config.status_timeout(),
    )
    .expect("Failed to initialize status client");

    let registry = Arc::new(JobRegistry::open(store.clone(), Arc::new(SystemClock)).await);
    let poller = Arc::new(StatusPoller::new(
        Arc::clone(&registry),
        Arc::new(status_client),
        Arc::new(PgResultFetcher::new(db_pool)),
        config.max_job_age(),
    ));
    let scheduler = PollScheduler::new(Arc::clone(&poller), config.poll_interval());
    scheduler.resume_open_jobs(&registry).await;

    let state = AppState::new(store, poller, scheduler);
    let scheduler = Arc::clone(&state.scheduler);

    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .expect("Server error");

    scheduler.shutdown();
}
