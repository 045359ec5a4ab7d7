use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::job::{JobUpdate, NewJob, PollOutcome, TransformationJob};

/// GET /api/v1/jobs — every tracked job, in submission order.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<TransformationJob>> {
    Json(state.registry.list().await)
}

/// POST /api/v1/jobs — start tracking a submitted job and begin polling it.
pub async fn add_job(
    State(state): State<AppState>,
    Json(new_job): Json<NewJob>,
) -> Result<(StatusCode, Json<TransformationJob>), StatusCode> {
    if let Err(report) = new_job.validate() {
        tracing::debug!(error = %report, "Rejected job submission");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let job = state
        .registry
        .add(new_job)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state.scheduler.schedule(&job.job_id);
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<TransformationJob>, StatusCode> {
    state
        .registry
        .get(&job_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// PATCH /api/v1/jobs/{job_id} — merge a partial update into one job.
pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(update): Json<JobUpdate>,
) -> Result<Json<TransformationJob>, StatusCode> {
    update
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    if !update.is_complete() {
        tracing::debug!(job_id, "Rejected completion without a processed image");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let job = state
        .registry
        .update(&job_id, update)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !job.is_open() {
        state.scheduler.cancel(&job_id);
    }
    Ok(Json(job))
}

/// DELETE /api/v1/jobs/{job_id} — stop polling and forget the job.
pub async fn remove_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state.scheduler.cancel(&job_id);
    match state.registry.remove(&job_id).await {
        Ok(Some(_)) => Ok(StatusCode::NO_CONTENT),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /api/v1/jobs/{job_id}/poll — poll the status endpoint once, now.
pub async fn poll_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<PollOutcome>, StatusCode> {
    match state.poller.poll(&job_id).await {
        PollOutcome::NotTracked => Err(StatusCode::NOT_FOUND),
        outcome => Ok(Json(outcome)),
    }
}
