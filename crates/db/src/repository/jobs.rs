//! `jobs` table queries.
//!
//! Status transitions are single `UPDATE … WHERE status = …` statements, so
//! two writers racing on the same job see exactly one affected row between
//! them.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Job, JobId, JobRow, JobStatus, NewJob, PipelineId};
use crate::{DbError, DbPool};

const JOB_COLUMNS: &str = "id, pipeline_id, node_id, node_type_id, label, status, priority, \
     input_data, output_data, metadata, dependent_jobs, retry_count, max_retries, \
     started_at, completed_at, error_message, created_at, updated_at";

/// Insert a new job in `pending` status.
pub async fn insert_job(pool: &DbPool, new: NewJob) -> Result<Job, DbError> {
    let job = Job::from_new(JobId(Uuid::new_v4()), new);
    let metadata = serde_json::to_value(&job.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO jobs
            (id, pipeline_id, node_id, node_type_id, label, status, priority,
             input_data, metadata, dependent_jobs, retry_count, max_retries,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $12)
        "#,
    )
    .bind(job.id.0)
    .bind(job.pipeline_id.0)
    .bind(job.node_id.as_str())
    .bind(&job.node_type_id)
    .bind(&job.label)
    .bind(job.status.as_str())
    .bind(job.priority)
    .bind(&job.input_data)
    .bind(metadata)
    .bind(Vec::<Uuid>::new())
    .bind(to_i32(job.max_retries))
    .bind(job.created_at)
    .execute(pool)
    .await?;

    Ok(job)
}

/// Overwrite every mutable column of a job.
pub async fn update_job(pool: &DbPool, job: &Job) -> Result<(), DbError> {
    let metadata = serde_json::to_value(&job.metadata)?;
    let dependent: Vec<Uuid> = job.dependent_jobs.iter().map(|id| id.0).collect();

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2, priority = $3, input_data = $4, output_data = $5,
            metadata = $6, dependent_jobs = $7, retry_count = $8, max_retries = $9,
            started_at = $10, completed_at = $11, error_message = $12, updated_at = $13
        WHERE id = $1
        "#,
    )
    .bind(job.id.0)
    .bind(job.status.as_str())
    .bind(job.priority)
    .bind(&job.input_data)
    .bind(&job.output_data)
    .bind(metadata)
    .bind(dependent)
    .bind(to_i32(job.retry_count))
    .bind(to_i32(job.max_retries))
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(&job.error_message)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Fetch a single job by its primary key.
pub async fn get_job(pool: &DbPool, id: JobId) -> Result<Job, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// All jobs of a pipeline, oldest first.
pub async fn list_jobs(pool: &DbPool, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE pipeline_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(pipeline_id.0)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Jobs of a pipeline in the given status, oldest first.
pub async fn list_jobs_by_status(
    pool: &DbPool,
    pipeline_id: PipelineId,
    status: JobStatus,
) -> Result<Vec<Job>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE pipeline_id = $1 AND status = $2 \
         ORDER BY created_at ASC, id ASC"
    ))
    .bind(pipeline_id.0)
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Atomically move a job from `pending` to `running`.
pub async fn claim_job(pool: &DbPool, id: JobId) -> Result<bool, DbError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'running', started_at = $2, updated_at = $2
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id.0)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Atomically move a job from `running` to `completed`.
pub async fn complete_job(pool: &DbPool, id: JobId, output: &Value) -> Result<Option<Job>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = 'completed', output_data = $2, error_message = NULL,
            completed_at = $3, updated_at = $3
        WHERE id = $1 AND status = 'running'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(id.0)
    .bind(output)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

/// Atomically record a failure of a `running` job, re-queueing it while
/// retries remain.  Right-hand sides see the pre-update row.
pub async fn fail_job(
    pool: &DbPool,
    id: JobId,
    message: &str,
    retry: bool,
) -> Result<Option<Job>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status       = CASE WHEN $3 AND retry_count < max_retries THEN 'pending' ELSE 'failed' END,
            retry_count  = CASE WHEN $3 AND retry_count < max_retries THEN retry_count + 1 ELSE retry_count END,
            started_at   = CASE WHEN $3 AND retry_count < max_retries THEN NULL ELSE started_at END,
            completed_at = CASE WHEN $3 AND retry_count < max_retries THEN NULL ELSE $4 END,
            error_message = $2,
            updated_at = $4
        WHERE id = $1 AND status = 'running'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(id.0)
    .bind(message)
    .bind(retry)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

/// Cancel every non-terminal job of a pipeline.
pub async fn cancel_jobs(pool: &DbPool, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = 'cancelled', completed_at = $2, updated_at = $2
        WHERE pipeline_id = $1 AND status IN ('pending', 'running')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(pipeline_id.0)
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Remove every job belonging to a pipeline.
pub async fn delete_jobs(pool: &DbPool, pipeline_id: PipelineId) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM jobs WHERE pipeline_id = $1")
        .bind(pipeline_id.0)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
