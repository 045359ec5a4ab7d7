use chrono::Duration;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::models::job::{JobUpdate, PollOutcome};
use crate::models::remote::RemoteStatus;
use crate::services::progress::estimate_progress;
use crate::services::registry::{Closing, JobRegistry};
use crate::services::results::ResultSource;
use crate::services::status::StatusSource;
use crate::services::store::StoreError;

pub const REMOTE_FAILURE_MESSAGE: &str = "Processing failed";
pub const TIMED_OUT_MESSAGE: &str = "Processing timed out";

/// Polls the remote status of one job and folds the answer into the registry.
///
/// At most one poll per job is in flight. A poll that arrives while another
/// is running reports the current record instead of calling out again.
pub struct StatusPoller {
    registry: Arc<JobRegistry>,
    status: Arc<dyn StatusSource>,
    results: Arc<dyn ResultSource>,
    max_job_age: Duration,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a job as being polled until dropped.
struct InFlight<'a> {
    jobs: &'a Mutex<HashSet<String>>,
    job_id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.job_id);
    }
}

impl StatusPoller {
    pub fn new(
        registry: Arc<JobRegistry>,
        status: Arc<dyn StatusSource>,
        results: Arc<dyn ResultSource>,
        max_job_age: Duration,
    ) -> Self {
        Self {
            registry,
            status,
            results,
            max_job_age,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub async fn health_check(&self) -> Result<(), String> {
        self.results.health_check().await
    }

    /// Whether `job_id` is tracked and still processing.
    pub async fn is_open(&self, job_id: &str) -> bool {
        self.registry
            .get(job_id)
            .await
            .is_some_and(|job| job.is_open())
    }

    /// Poll once. Never retries; transport errors leave the record as is.
    pub async fn poll(&self, job_id: &str) -> PollOutcome {
        let Some(_claim) = self.claim(job_id) else {
            tracing::debug!(job_id, "Poll already in flight, reporting current record");
            return match self.registry.get(job_id).await {
                Some(job) => PollOutcome::from_record(&job),
                None => PollOutcome::NotTracked,
            };
        };

        let Some(job) = self.registry.get(job_id).await else {
            tracing::debug!(job_id, "Poll for untracked job");
            return PollOutcome::NotTracked;
        };

        if !job.is_open() {
            return PollOutcome::from_record(&job);
        }

        metrics::counter!("transformation_polls_total").increment(1);
        let now = self.registry.clock().now();
        let elapsed = now - job.started_at;

        if elapsed > self.max_job_age {
            tracing::warn!(
                job_id,
                elapsed_secs = elapsed.num_seconds(),
                "Job exceeded max age, marking failed"
            );
            return self
                .write_failure(job_id, TIMED_OUT_MESSAGE, JobUpdate::failed(TIMED_OUT_MESSAGE, now))
                .await;
        }

        let remote = match self.status.fetch_status(job_id).await {
            Ok(status) => status,
            Err(e) => {
                metrics::counter!("transformation_poll_errors_total").increment(1);
                tracing::warn!(job_id, error = %e, "Status poll failed");
                return PollOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        tracing::debug!(job_id, remote_status = %remote, "Polled job status");

        match remote {
            RemoteStatus::Completed => {
                let Some(artifact) = self.results.fetch_result(job.correlation_id).await else {
                    tracing::info!(
                        job_id,
                        correlation_id = %job.correlation_id,
                        "Job completed remotely but result not available yet"
                    );
                    return PollOutcome::Processing {
                        progress: job.progress,
                    };
                };

                let closing = self
                    .registry
                    .close(job_id, JobUpdate::completed(artifact.clone(), now))
                    .await;
                settle(closing, || {
                    metrics::counter!("transformation_jobs_completed").increment(1);
                    tracing::info!(
                        job_id,
                        duration_ms = elapsed.num_milliseconds(),
                        "Transformation completed"
                    );
                    PollOutcome::Completed { artifact }
                })
            }
            RemoteStatus::Failed => {
                self.write_failure(
                    job_id,
                    REMOTE_FAILURE_MESSAGE,
                    JobUpdate::failed(REMOTE_FAILURE_MESSAGE, now),
                )
                .await
            }
            other => {
                let progress = estimate_progress(other, elapsed);
                match self.registry.update(job_id, JobUpdate::progress(progress)).await {
                    Ok(Some(updated)) => PollOutcome::from_record(&updated),
                    Ok(None) => PollOutcome::NotTracked,
                    Err(e) => PollOutcome::Error {
                        message: e.to_string(),
                    },
                }
            }
        }
    }

    fn claim<'a>(&'a self, job_id: &'a str) -> Option<InFlight<'a>> {
        let mut jobs = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !jobs.insert(job_id.to_string()) {
            return None;
        }
        Some(InFlight {
            jobs: &self.in_flight,
            job_id,
        })
    }

    async fn write_failure(&self, job_id: &str, message: &str, update: JobUpdate) -> PollOutcome {
        let closing = self.registry.close(job_id, update).await;
        settle(closing, || {
            metrics::counter!("transformation_jobs_failed").increment(1);
            tracing::info!(job_id, error = message, "Transformation failed");
            PollOutcome::Failed {
                error: message.to_string(),
            }
        })
    }
}

/// Outcome of a terminal write. `on_closed` runs only when this poll is the
/// one that finished the job.
fn settle(
    closing: Result<Closing, StoreError>,
    on_closed: impl FnOnce() -> PollOutcome,
) -> PollOutcome {
    match closing {
        Ok(Closing::Closed(_)) => on_closed(),
        Ok(Closing::AlreadyClosed(job)) => PollOutcome::from_record(&job),
        Ok(Closing::NotTracked) => PollOutcome::NotTracked,
        Err(e) => PollOutcome::Error {
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobStatus, NewJob};
    use crate::services::clock::{Clock, ManualClock};
    use crate::services::status::StatusError;
    use crate::services::store::{JobStore, MemorySlot, DEFAULT_JOB_SLOT_KEY};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FixedStatus {
        status: Mutex<Option<RemoteStatus>>,
        calls: AtomicUsize,
    }

    impl FixedStatus {
        fn new(status: Option<RemoteStatus>) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(status),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, status: Option<RemoteStatus>) {
            *self.status.lock().unwrap() = status;
        }
    }

    #[async_trait]
    impl StatusSource for FixedStatus {
        async fn fetch_status(&self, _job_id: &str) -> Result<RemoteStatus, StatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match *self.status.lock().unwrap() {
                Some(status) => Ok(status),
                None => Err(StatusError::Decode(
                    serde_json::from_str::<serde_json::Value>("<html>").unwrap_err(),
                )),
            }
        }
    }

    struct FixedResult(Mutex<Option<String>>);

    #[async_trait]
    impl ResultSource for FixedResult {
        async fn fetch_result(&self, _correlation_id: Uuid) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        status: Arc<FixedStatus>,
        result: Arc<FixedResult>,
        registry: Arc<JobRegistry>,
        poller: StatusPoller,
    }

    async fn harness(status: Option<RemoteStatus>, result: Option<&str>) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let store = JobStore::new(Arc::new(MemorySlot::new()), DEFAULT_JOB_SLOT_KEY);
        let registry = Arc::new(JobRegistry::open(store, clock.clone()).await);
        registry
            .add(NewJob {
                job_id: "req-1".to_string(),
                correlation_id: Uuid::new_v4(),
                selected_style: "comic".to_string(),
            })
            .await
            .unwrap();

        let status = FixedStatus::new(status);
        let result = Arc::new(FixedResult(Mutex::new(result.map(str::to_string))));
        let poller = StatusPoller::new(
            registry.clone(),
            status.clone(),
            result.clone(),
            Duration::minutes(15),
        );
        Harness {
            clock,
            status,
            result,
            registry,
            poller,
        }
    }

    #[tokio::test]
    async fn test_in_progress_ramps_progress() {
        let h = harness(Some(RemoteStatus::InProgress), None).await;
        h.clock.advance(Duration::seconds(10));

        let outcome = h.poller.poll("req-1").await;
        assert_eq!(outcome, PollOutcome::Processing { progress: 50.0 });
        assert_eq!(h.registry.get("req-1").await.unwrap().progress, 50.0);
    }

    #[tokio::test]
    async fn test_queued_keeps_initial_progress() {
        let h = harness(Some(RemoteStatus::InQueue), None).await;
        h.clock.advance(Duration::seconds(30));
        assert_eq!(h.poller.poll("req-1").await, PollOutcome::Processing { progress: 10.0 });
    }

    #[tokio::test]
    async fn test_completed_with_result() {
        let h = harness(Some(RemoteStatus::Completed), Some("https://cdn.example.com/out.png")).await;
        h.clock.advance(Duration::seconds(18));

        let outcome = h.poller.poll("req-1").await;
        assert_eq!(
            outcome,
            PollOutcome::Completed {
                artifact: "https://cdn.example.com/out.png".to_string()
            }
        );

        let job = h.registry.get("req-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_image.as_deref(), Some("https://cdn.example.com/out.png"));
        assert_eq!(job.completed_at, Some(h.clock.now()));
        assert_eq!(job.progress, 100.0);
    }

    #[tokio::test]
    async fn test_completed_without_result_leaves_record() {
        let h = harness(Some(RemoteStatus::Completed), None).await;
        let before = h.registry.get("req-1").await.unwrap();

        let outcome = h.poller.poll("req-1").await;
        assert_eq!(outcome, PollOutcome::Processing { progress: 10.0 });
        assert_eq!(h.registry.get("req-1").await.unwrap(), before);

        *h.result.0.lock().unwrap() = Some("https://cdn.example.com/late.png".to_string());
        assert!(matches!(h.poller.poll("req-1").await, PollOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_remote_failure_is_terminal() {
        let h = harness(Some(RemoteStatus::InProgress), None).await;
        h.clock.advance(Duration::seconds(15));
        h.poller.poll("req-1").await;

        h.status.set(Some(RemoteStatus::Failed));
        let outcome = h.poller.poll("req-1").await;
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                error: "Processing failed".to_string()
            }
        );

        let job = h.registry.get("req-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Processing failed"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_mutate() {
        let h = harness(None, None).await;
        let before = h.registry.get("req-1").await.unwrap();

        let outcome = h.poller.poll("req-1").await;
        assert!(matches!(outcome, PollOutcome::Error { .. }));
        assert_eq!(h.registry.get("req-1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_polled_again() {
        let h = harness(Some(RemoteStatus::Failed), None).await;
        h.poller.poll("req-1").await;
        let calls = h.status.calls.load(Ordering::SeqCst);

        h.status.set(Some(RemoteStatus::Completed));
        assert!(matches!(h.poller.poll("req-1").await, PollOutcome::Failed { .. }));
        assert_eq!(h.status.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_stale_job_times_out() {
        let h = harness(Some(RemoteStatus::InProgress), None).await;
        h.clock.advance(Duration::minutes(16));

        let outcome = h.poller.poll("req-1").await;
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                error: TIMED_OUT_MESSAGE.to_string()
            }
        );
        assert_eq!(h.status.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_untracked_job() {
        let h = harness(Some(RemoteStatus::InProgress), None).await;
        assert_eq!(h.poller.poll("missing").await, PollOutcome::NotTracked);
    }

    /// Answers after a delay so overlapping polls can be observed.
    struct SlowStatus {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusSource for SlowStatus {
        async fn fetch_status(&self, _job_id: &str) -> Result<RemoteStatus, StatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(RemoteStatus::Completed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_polls_complete_once() {
        let h = harness(None, Some("https://cdn.example.com/out.png")).await;
        let status = Arc::new(SlowStatus {
            calls: AtomicUsize::new(0),
        });
        let poller = StatusPoller::new(
            h.registry.clone(),
            status.clone(),
            h.result.clone(),
            Duration::minutes(15),
        );
        h.clock.advance(Duration::seconds(12));
        let stamped = h.clock.now();

        let (first, second) = tokio::join!(poller.poll("req-1"), poller.poll("req-1"));
        assert_eq!(status.calls.load(Ordering::SeqCst), 1);

        let completed = PollOutcome::Completed {
            artifact: "https://cdn.example.com/out.png".to_string(),
        };
        let overlapping = PollOutcome::Processing { progress: 10.0 };
        assert!(
            (first == completed && second == overlapping)
                || (first == overlapping && second == completed),
            "unexpected outcomes {first:?} / {second:?}"
        );

        h.clock.advance(Duration::seconds(30));
        assert_eq!(poller.poll("req-1").await, completed);
        assert_eq!(status.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.registry.get("req-1").await.unwrap().completed_at, Some(stamped));
    }

    #[tokio::test]
    async fn test_poll_after_manual_close_reports_record() {
        let h = harness(Some(RemoteStatus::Completed), Some("https://cdn.example.com/late.png")).await;
        h.registry
            .update(
                "req-1",
                JobUpdate::completed("https://cdn.example.com/manual.png".to_string(), h.clock.now()),
            )
            .await
            .unwrap();
        let before = h.registry.get("req-1").await.unwrap();

        h.clock.advance(Duration::seconds(5));
        assert_eq!(
            h.poller.poll("req-1").await,
            PollOutcome::Completed {
                artifact: "https://cdn.example.com/manual.png".to_string()
            }
        );
        assert_eq!(h.registry.get("req-1").await.unwrap(), before);
    }
}
