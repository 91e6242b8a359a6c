//! `pipelines` table queries.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Pipeline, PipelineId, PipelineRow};
use crate::{DbError, DbPool};

/// Insert a new pipeline in `pending` status.
pub async fn insert_pipeline(pool: &DbPool, workflow_id: &str) -> Result<Pipeline, DbError> {
    let pipeline = Pipeline::new(PipelineId(Uuid::new_v4()), workflow_id);

    sqlx::query(
        r#"
        INSERT INTO pipelines (id, workflow_id, status, job_ids, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        "#,
    )
    .bind(pipeline.id.0)
    .bind(&pipeline.workflow_id)
    .bind(pipeline.status.as_str())
    .bind(Vec::<Uuid>::new())
    .bind(pipeline.created_at)
    .execute(pool)
    .await?;

    Ok(pipeline)
}

/// Fetch a single pipeline by its primary key.
pub async fn get_pipeline(pool: &DbPool, id: PipelineId) -> Result<Pipeline, DbError> {
    let row = sqlx::query_as::<_, PipelineRow>(
        "SELECT id, workflow_id, status, job_ids, created_at, updated_at FROM pipelines WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Persist status and job list of a pipeline.
pub async fn update_pipeline(pool: &DbPool, pipeline: &Pipeline) -> Result<(), DbError> {
    let job_ids: Vec<Uuid> = pipeline.job_ids.iter().map(|id| id.0).collect();
    let result = sqlx::query(
        "UPDATE pipelines SET status = $2, job_ids = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(pipeline.id.0)
    .bind(pipeline.status.as_str())
    .bind(job_ids)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
