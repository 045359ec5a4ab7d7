use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;

/// Looks up the artifact of a finished job by correlation id.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// `None` means "not available yet", never a hard failure.
    async fn fetch_result(&self, correlation_id: Uuid) -> Option<String>;

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Reads the hosted `transformations` table.
pub struct PgResultFetcher {
    pool: PgPool,
}

impl PgResultFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultSource for PgResultFetcher {
    async fn fetch_result(&self, correlation_id: Uuid) -> Option<String> {
        match queries::get_transformation_output(&self.pool, correlation_id).await {
            Ok(Some(output)) => Some(output),
            Ok(None) => {
                tracing::debug!(%correlation_id, "Transformation output not written yet");
                None
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "Result lookup failed");
                None
            }
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        queries::ping(&self.pool).await.map_err(|e| e.to_string())
    }
}
