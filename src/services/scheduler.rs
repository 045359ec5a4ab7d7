//! Per-job repeating poll tasks.
//!
//! Each open job gets one tokio task that polls, waits for the next tick,
//! and polls again until the job reaches a terminal state, disappears from
//! the registry, or is cancelled. A job never has two polls in flight, and
//! cancelling a task never interrupts a poll that has already started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::services::poller::StatusPoller;
use crate::services::registry::JobRegistry;

struct ScheduledPoll {
    generation: u64,
    cancel: CancellationToken,
}

type TaskMap = Arc<Mutex<HashMap<String, ScheduledPoll>>>;

pub struct PollScheduler {
    poller: Arc<StatusPoller>,
    interval: Duration,
    tasks: TaskMap,
    next_generation: AtomicU64,
}

impl PollScheduler {
    pub fn new(poller: Arc<StatusPoller>, interval: Duration) -> Self {
        Self {
            poller,
            interval,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Start polling `job_id`. Returns `false` if it is already scheduled.
    pub fn schedule(&self, job_id: &str) -> bool {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut tasks = lock(&self.tasks);
            if tasks.contains_key(job_id) {
                return false;
            }
            tasks.insert(
                job_id.to_string(),
                ScheduledPoll {
                    generation,
                    cancel: cancel.clone(),
                },
            );
        }

        tracing::debug!(job_id, interval_ms = self.interval.as_millis() as u64, "Scheduling job polls");

        let poller = Arc::clone(&self.poller);
        let tasks = Arc::clone(&self.tasks);
        let interval = self.interval;
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            run_poll_loop(&poller, &job_id, interval, &cancel).await;

            let mut tasks = lock(&tasks);
            if tasks.get(&job_id).is_some_and(|t| t.generation == generation) {
                tasks.remove(&job_id);
            }
        });

        true
    }

    /// Stop polling `job_id`. Returns `false` if it was not scheduled.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock(&self.tasks).remove(job_id) {
            Some(task) => {
                task.cancel.cancel();
                tracing::debug!(job_id, "Cancelled job polls");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, job_id: &str) -> bool {
        lock(&self.tasks).contains_key(job_id)
    }

    pub fn scheduled_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.tasks).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Schedule every job the registry still holds as processing.
    pub async fn resume_open_jobs(&self, registry: &JobRegistry) -> usize {
        let mut resumed = 0;
        for job_id in registry.open_job_ids().await {
            if self.schedule(&job_id) {
                resumed += 1;
            }
        }
        if resumed > 0 {
            tracing::info!(resumed, "Resumed polling for persisted jobs");
        }
        resumed
    }

    /// Cancel every scheduled task.
    pub fn shutdown(&self) {
        let drained: Vec<(String, ScheduledPoll)> = lock(&self.tasks).drain().collect();
        for (_, task) in &drained {
            task.cancel.cancel();
        }
        tracing::info!(cancelled = drained.len(), "Poll scheduler stopped");
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for task in lock(&self.tasks).values() {
            task.cancel.cancel();
        }
    }
}

async fn run_poll_loop(
    poller: &StatusPoller,
    job_id: &str,
    interval: Duration,
    cancel: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // A started poll always runs to completion; cancellation is only
        // observed between polls.
        let outcome = poller.poll(job_id).await;
        if cancel.is_cancelled() {
            return;
        }

        if outcome.ends_polling() || !poller.is_open(job_id).await {
            tracing::debug!(job_id, ?outcome, "Job polling finished");
            return;
        }
    }
}

fn lock(tasks: &TaskMap) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledPoll>> {
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}
