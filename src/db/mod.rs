use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Initialize the PostgreSQL pool for the hosted result table.
///
/// The tracker only reads single rows, so the pool stays small.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

pub mod queries;
