use serde::Deserialize;
use std::time::Duration;

use crate::services::store::DEFAULT_JOB_SLOT_KEY;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string for the hosted result table
    pub database_url: String,

    /// Redis connection string for the persisted job slot
    pub redis_url: String,

    /// Base URL of the transformation status endpoint; the job id is appended
    pub status_base_url: String,

    /// Bearer token for the transformation API
    pub status_api_key: String,

    /// Delay between two polls of the same job
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Jobs still processing after this long are marked failed
    #[serde(default = "default_max_job_age_secs")]
    pub max_job_age_secs: u64,

    /// Per-request timeout for the status endpoint
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,

    /// Key of the persisted job slot
    #[serde(default = "default_job_slot_key")]
    pub job_slot_key: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_job_age_secs() -> u64 {
    900
}

fn default_status_timeout_secs() -> u64 {
    30
}

fn default_job_slot_key() -> String {
    DEFAULT_JOB_SLOT_KEY.to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_job_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_job_age_secs as i64)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }
}
