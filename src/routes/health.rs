use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tracked_jobs: usize,
    pub scheduled_polls: usize,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    pub result_table: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_check<E>(result: Result<(), E>, start: std::time::Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(_) => Self {
                status: "error".to_string(),
                latency_ms: None,
            },
        }
    }
}

/// GET /health — tracker health with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_start = std::time::Instant::now();
    let store_check = ComponentHealth::from_check(state.store.health_check().await, store_start);

    let results_start = std::time::Instant::now();
    let results_check = ComponentHealth::from_check(state.poller.health_check().await, results_start);

    let all_healthy = store_check.status == "ok" && results_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        tracked_jobs: state.registry.list().await.len(),
        scheduled_polls: state.scheduler.scheduled_jobs().len(),
        checks: HealthChecks {
            job_store: store_check,
            result_table: results_check,
        },
    };

    (status_code, Json(response))
}
