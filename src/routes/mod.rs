use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod jobs;
pub mod metrics;

/// Health check plus the job API consumed by the presentation layer.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::add_job))
        .route(
            "/api/v1/jobs/{job_id}",
            get(jobs::get_job)
                .patch(jobs::update_job)
                .delete(jobs::remove_job),
        )
        .route("/api/v1/jobs/{job_id}/poll", post(jobs::poll_job))
        .with_state(state)
}
