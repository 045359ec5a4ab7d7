use std::sync::Arc;

use crate::services::{
    poller::StatusPoller,
    registry::JobRegistry,
    scheduler::PollScheduler,
    store::JobStore,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub poller: Arc<StatusPoller>,
    pub scheduler: Arc<PollScheduler>,
    pub store: JobStore,
}

impl AppState {
    pub fn new(store: JobStore, poller: Arc<StatusPoller>, scheduler: PollScheduler) -> Self {
        Self {
            registry: Arc::clone(poller.registry()),
            poller,
            scheduler: Arc::new(scheduler),
            store,
        }
    }
}
