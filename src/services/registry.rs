use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::job::{JobUpdate, NewJob, TransformationJob};
use crate::services::clock::Clock;
use crate::services::store::{JobStore, StoreError};

/// In-memory list of tracked jobs, written through to a [`JobStore`].
///
/// Every mutation builds the next list, persists it, and only then replaces
/// the in-memory copy, so the two never disagree. A failed write leaves both
/// unchanged. The write and the commit run on a spawned task, so a caller
/// that is dropped mid-write cannot split them.
pub struct JobRegistry {
    jobs: Arc<Mutex<Vec<TransformationJob>>>,
    store: JobStore,
    clock: Arc<dyn Clock>,
}

/// Result of moving a record into a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum Closing {
    /// This call finished the job.
    Closed(TransformationJob),
    /// The job had already finished; the record is unchanged.
    AlreadyClosed(TransformationJob),
    NotTracked,
}

/// Next list to persist, if anything changed, plus the caller's result.
struct Mutation<R> {
    next: Option<Vec<TransformationJob>>,
    output: R,
}

impl<R> Mutation<R> {
    fn unchanged(output: R) -> Self {
        Self { next: None, output }
    }
}

enum Merge {
    Applied(TransformationJob),
    Rejected(TransformationJob),
    Missing,
}

impl JobRegistry {
    /// Seed the registry from whatever the store holds.
    pub async fn open(store: JobStore, clock: Arc<dyn Clock>) -> Self {
        let jobs = store.load().await;
        tracing::info!(key = store.key(), jobs = jobs.len(), "Job registry loaded");
        metrics::gauge!("transformation_jobs_tracked").set(jobs.len() as f64);
        Self {
            jobs: Arc::new(Mutex::new(jobs)),
            store,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start tracking a job. A record with the same id is replaced.
    pub async fn add(&self, new: NewJob) -> Result<TransformationJob, StoreError> {
        let job = TransformationJob::start(new, self.clock.now());

        let added = job.clone();
        self.mutate(move |current| {
            let mut next = current.to_vec();
            match next.iter_mut().find(|j| j.job_id == added.job_id) {
                Some(existing) => {
                    tracing::warn!(job_id = %added.job_id, "Job already tracked, replacing record");
                    *existing = added;
                }
                None => next.push(added),
            }
            Mutation {
                next: Some(next),
                output: (),
            }
        })
        .await?;

        tracing::info!(
            job_id = %job.job_id,
            correlation_id = %job.correlation_id,
            style = %job.selected_style,
            "Tracking transformation job"
        );
        Ok(job)
    }

    /// Merge `update` into the matching record. Returns `None` without
    /// touching the store when no record matches. A finished record is
    /// returned unchanged.
    pub async fn update(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<Option<TransformationJob>, StoreError> {
        Ok(match self.merge(job_id, update).await? {
            Merge::Applied(job) | Merge::Rejected(job) => Some(job),
            Merge::Missing => None,
        })
    }

    /// Apply a terminal update, reporting whether this call is the one that
    /// finished the job.
    pub async fn close(&self, job_id: &str, update: JobUpdate) -> Result<Closing, StoreError> {
        Ok(match self.merge(job_id, update).await? {
            Merge::Applied(job) => Closing::Closed(job),
            Merge::Rejected(job) => Closing::AlreadyClosed(job),
            Merge::Missing => Closing::NotTracked,
        })
    }

    /// Stop tracking a job.
    pub async fn remove(&self, job_id: &str) -> Result<Option<TransformationJob>, StoreError> {
        let job_id = job_id.to_string();
        let removed = self
            .mutate(move |current| {
                let Some(index) = current.iter().position(|j| j.job_id == job_id) else {
                    return Mutation::unchanged(None);
                };
                let mut next = current.to_vec();
                let removed = next.remove(index);
                Mutation {
                    next: Some(next),
                    output: Some(removed),
                }
            })
            .await?;

        if let Some(job) = &removed {
            tracing::info!(job_id = %job.job_id, status = %job.status, "Stopped tracking job");
        }
        Ok(removed)
    }

    pub async fn get(&self, job_id: &str) -> Option<TransformationJob> {
        self.jobs
            .lock()
            .await
            .iter()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<TransformationJob> {
        self.jobs.lock().await.clone()
    }

    /// Ids of jobs still processing.
    pub async fn open_job_ids(&self) -> Vec<String> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|j| j.is_open())
            .map(|j| j.job_id.clone())
            .collect()
    }

    async fn merge(&self, job_id: &str, update: JobUpdate) -> Result<Merge, StoreError> {
        let job_id = job_id.to_string();
        let now = self.clock.now();
        self.mutate(move |current| {
            let Some(index) = current.iter().position(|j| j.job_id == job_id) else {
                return Mutation::unchanged(Merge::Missing);
            };

            let mut next = current.to_vec();
            let job = &mut next[index];
            let was_open = job.is_open();
            if !update.apply_to(job) {
                return Mutation::unchanged(Merge::Rejected(current[index].clone()));
            }
            if was_open && !job.is_open() && job.completed_at.is_none() {
                job.completed_at = Some(now);
            }
            let updated = job.clone();
            Mutation {
                next: Some(next),
                output: Merge::Applied(updated),
            }
        })
        .await
    }

    async fn mutate<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&[TransformationJob]) -> Mutation<R> + Send + 'static,
    {
        let jobs = Arc::clone(&self.jobs);
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let mut current = jobs.lock().await;
            let Mutation { next, output } = f(&current);
            if let Some(next) = next {
                if let Err(e) = store.save(&next).await {
                    tracing::error!(key = store.key(), error = %e, "Failed to persist job registry");
                    return Err(e);
                }
                *current = next;
                metrics::gauge!("transformation_jobs_tracked").set(current.len() as f64);
            }
            Ok(output)
        });
        task.await?
    }
}
