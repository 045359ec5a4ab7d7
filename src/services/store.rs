use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::models::job::TransformationJob;

pub const DEFAULT_JOB_SLOT_KEY: &str = "photobooth:transformation_jobs";

/// A durable string-valued key-value slot.
#[async_trait]
pub trait KeyValueSlot: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn clear(&self, key: &str) -> Result<(), StoreError>;

    /// Check connectivity (for health checks).
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Redis-backed slot.
pub struct RedisSlot {
    client: redis::Client,
}

impl RedisSlot {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeyValueSlot for RedisSlot {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process slot; contents die with the process.
#[derive(Debug, Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw slot contents, bypassing deserialization.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Overwrite raw slot contents.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl KeyValueSlot for MemorySlot {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.raw(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put_raw(key, value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Serializes the full job list into a single slot.
#[derive(Clone)]
pub struct JobStore {
    slot: Arc<dyn KeyValueSlot>,
    key: String,
}

impl JobStore {
    pub fn new(slot: Arc<dyn KeyValueSlot>, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write the full list, or clear the slot when the list is empty.
    pub async fn save(&self, jobs: &[TransformationJob]) -> Result<(), StoreError> {
        if jobs.is_empty() {
            return self.slot.clear(&self.key).await;
        }
        let payload = serde_json::to_string(jobs)?;
        self.slot.write(&self.key, &payload).await
    }

    /// Read the persisted list. Absent, unreadable, or malformed slots all
    /// yield an empty list. Only the first record for each `jobId` is kept.
    pub async fn load(&self) -> Vec<TransformationJob> {
        let payload = match self.slot.read(&self.key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read persisted jobs, starting empty");
                return Vec::new();
            }
        };

        let jobs: Vec<TransformationJob> = match serde_json::from_str(&payload) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding malformed persisted jobs");
                return Vec::new();
            }
        };

        let mut seen = HashSet::with_capacity(jobs.len());
        jobs.into_iter()
            .filter(|job| {
                let first = seen.insert(job.job_id.clone());
                if !first {
                    tracing::warn!(key = %self.key, job_id = %job.job_id, "Dropping duplicate persisted job");
                }
                first
            })
            .collect()
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.slot.health_check().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Registry write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
