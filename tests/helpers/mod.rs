//! Test doubles for the transformation API and the result table

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use photobooth_tracker::models::remote::RemoteStatus;
use photobooth_tracker::services::{
    clock::ManualClock,
    poller::StatusPoller,
    registry::JobRegistry,
    results::ResultSource,
    status::{StatusError, StatusSource},
    store::{JobStore, MemorySlot, DEFAULT_JOB_SLOT_KEY},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Remote statuses keyed by job id. Unknown ids fail like a broken transport.
#[derive(Default)]
pub struct FakeStatusApi {
    statuses: Mutex<HashMap<String, RemoteStatus>>,
}

impl FakeStatusApi {
    pub fn set(&self, job_id: &str, status: RemoteStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.to_string(), status);
    }

    pub fn unset(&self, job_id: &str) {
        self.statuses.lock().unwrap().remove(job_id);
    }
}

#[async_trait]
impl StatusSource for FakeStatusApi {
    async fn fetch_status(&self, job_id: &str) -> Result<RemoteStatus, StatusError> {
        let status = self.statuses.lock().unwrap().get(job_id).copied();
        status.ok_or_else(|| {
            StatusError::Decode(serde_json::from_str::<serde_json::Value>("").unwrap_err())
        })
    }
}

/// Output column of the hosted table, keyed by correlation id.
#[derive(Default)]
pub struct FakeResultTable {
    rows: Mutex<HashMap<Uuid, String>>,
}

impl FakeResultTable {
    pub fn insert(&self, correlation_id: Uuid, output: &str) {
        self.rows
            .lock()
            .unwrap()
            .insert(correlation_id, output.to_string());
    }
}

#[async_trait]
impl ResultSource for FakeResultTable {
    async fn fetch_result(&self, correlation_id: Uuid) -> Option<String> {
        self.rows.lock().unwrap().get(&correlation_id).cloned()
    }
}

pub struct Tracker {
    pub slot: Arc<MemorySlot>,
    pub store: JobStore,
    pub clock: Arc<ManualClock>,
    pub api: Arc<FakeStatusApi>,
    pub table: Arc<FakeResultTable>,
    pub registry: Arc<JobRegistry>,
    pub poller: Arc<StatusPoller>,
}

/// Wire a tracker over in-memory fakes, starting from `slot`.
pub async fn tracker_with_slot(slot: Arc<MemorySlot>) -> Tracker {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 9, 1, 14, 0, 0).unwrap(),
    ));
    let store = JobStore::new(slot.clone(), DEFAULT_JOB_SLOT_KEY);
    let registry = Arc::new(JobRegistry::open(store.clone(), clock.clone()).await);
    let api = Arc::new(FakeStatusApi::default());
    let table = Arc::new(FakeResultTable::default());
    let poller = Arc::new(StatusPoller::new(
        registry.clone(),
        api.clone(),
        table.clone(),
        chrono::Duration::minutes(15),
    ));

    Tracker {
        slot,
        store,
        clock,
        api,
        table,
        registry,
        poller,
    }
}

pub async fn tracker() -> Tracker {
    tracker_with_slot(Arc::new(MemorySlot::new())).await
}
