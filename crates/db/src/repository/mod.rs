//! Repository contracts plus the Postgres query functions behind [`crate::PgStore`].
//!
//! The traits are what the engine is written against; the sub-modules hold
//! one function per SQL statement, taking a `&DbPool` and returning
//! `Result<T, DbError>`.

pub mod jobs;
pub mod pipelines;
pub mod workflows;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Job, JobId, JobStatus, NewJob, Pipeline, PipelineId};
use crate::DbError;

/// Persistence for jobs.
///
/// Status transitions after creation (`claim_job`, `complete_job`,
/// `fail_job`, `cancel_jobs`) are conditional on the current status and must
/// be atomic in every implementation: a transition that finds the job in an
/// unexpected status changes nothing.  `save_job` is an unconditional write
/// and is only used while a job is being wired, before it can be claimed.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job in `pending` status and assign its id.
    async fn create_job(&self, job: NewJob) -> Result<Job, DbError>;

    /// Overwrite a previously created job.
    async fn save_job(&self, job: &Job) -> Result<(), DbError>;

    async fn get_job(&self, id: JobId) -> Result<Job, DbError>;

    /// All jobs of a pipeline, in creation order.
    async fn load_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError>;

    async fn load_jobs_by_status(
        &self,
        pipeline_id: PipelineId,
        status: JobStatus,
    ) -> Result<Vec<Job>, DbError>;

    /// Move a job from `pending` to `running`.
    ///
    /// Returns `false` when the job was no longer pending.
    async fn claim_job(&self, id: JobId) -> Result<bool, DbError>;

    /// Move a `running` job to `completed` with its output.
    ///
    /// Returns `None`, leaving the job untouched, when it was not running.
    async fn complete_job(&self, id: JobId, output: Value) -> Result<Option<Job>, DbError>;

    /// Record a failure of a `running` job.
    ///
    /// With `retry` set and `retry_count < max_retries` the job goes back to
    /// `pending` with `retry_count + 1`; otherwise it becomes `failed`.  The
    /// message is stored either way.  Returns `None` when it was not running.
    async fn fail_job(&self, id: JobId, message: &str, retry: bool) -> Result<Option<Job>, DbError>;

    /// Move every `pending` or `running` job of a pipeline to `cancelled`.
    ///
    /// Returns the jobs that changed.
    async fn cancel_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError>;

    /// Delete every job of a pipeline; returns how many were removed.
    async fn delete_jobs(&self, pipeline_id: PipelineId) -> Result<u64, DbError>;
}

/// Persistence for pipelines.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn create_pipeline(&self, workflow_id: &str) -> Result<Pipeline, DbError>;

    async fn get_pipeline(&self, id: PipelineId) -> Result<Pipeline, DbError>;

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), DbError>;
}

/// Lookup of raw workflow definitions by id.
#[async_trait]
pub trait WorkflowDefinitions: Send + Sync {
    /// The stored JSON definition, or `None` when no such workflow exists.
    async fn workflow_definition(&self, id: &str) -> Result<Option<Value>, DbError>;
}
