use chrono::Duration;

use crate::models::job::INITIAL_PROGRESS;
use crate::models::remote::RemoteStatus;

/// Assumed average job duration for the linear ramp.
const EXPECTED_DURATION_MS: f64 = 20_000.0;

/// Highest estimate shown before completion is actually observed.
pub const MAX_ESTIMATED_PROGRESS: f64 = 90.0;

/// Estimate progress from elapsed time, with no real telemetry.
///
/// `IN_PROGRESS` ramps linearly from 10 to 90 over the expected duration and
/// stays at 90 afterwards. Any other non-terminal status reports 10.
pub fn estimate_progress(status: RemoteStatus, elapsed: Duration) -> f64 {
    match status {
        RemoteStatus::InProgress => {
            let elapsed_ms = elapsed.num_milliseconds().max(0) as f64;
            let ramp = (MAX_ESTIMATED_PROGRESS - INITIAL_PROGRESS) * elapsed_ms / EXPECTED_DURATION_MS;
            (INITIAL_PROGRESS + ramp).min(MAX_ESTIMATED_PROGRESS)
        }
        _ => INITIAL_PROGRESS,
    }
}
