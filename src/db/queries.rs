use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Get the output column of a finished transformation.
///
/// `Ok(None)` covers both a missing row and a row whose output is not
/// written yet.
pub async fn get_transformation_output(
    pool: &PgPool,
    correlation_id: Uuid,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT output
        FROM transformations
        WHERE id = $1
        "#,
    )
    .bind(correlation_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => Ok(r.try_get::<Option<String>, _>("output")?),
        None => Ok(None),
    }
}

/// Connectivity probe for health checks.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
