use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(
    axum::extract::State(handle): axum::extract::State<Arc<PrometheusHandle>>,
) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the tracker's metrics.
pub fn describe() {
    metrics::describe_counter!(
        "transformation_polls_total",
        "Status polls issued against the transformation API"
    );
    metrics::describe_counter!(
        "transformation_poll_errors_total",
        "Status polls that failed in transport or decoding"
    );
    metrics::describe_counter!(
        "transformation_jobs_completed",
        "Jobs that reached the completed state"
    );
    metrics::describe_counter!(
        "transformation_jobs_failed",
        "Jobs that failed remotely or timed out"
    );
    metrics::describe_gauge!(
        "transformation_jobs_tracked",
        "Jobs currently held in the registry"
    );
}
