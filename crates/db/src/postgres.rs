//! Postgres-backed implementation of the repository traits.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Job, JobId, JobStatus, NewJob, Pipeline, PipelineId};
use crate::repository::{jobs, pipelines, workflows};
use crate::repository::{JobRepository, PipelineRepository, WorkflowDefinitions};
use crate::{DbError, DbPool};

/// Repository over a shared [`DbPool`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Store (or replace) a workflow definition under `id`.
    pub async fn save_workflow(&self, id: &str, label: &str, definition: &Value) -> Result<(), DbError> {
        workflows::upsert_workflow(&self.pool, id, label, definition).await
    }
}

#[async_trait]
impl JobRepository for PgStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, DbError> {
        jobs::insert_job(&self.pool, job).await
    }

    async fn save_job(&self, job: &Job) -> Result<(), DbError> {
        jobs::update_job(&self.pool, job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Job, DbError> {
        jobs::get_job(&self.pool, id).await
    }

    async fn load_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        jobs::list_jobs(&self.pool, pipeline_id).await
    }

    async fn load_jobs_by_status(
        &self,
        pipeline_id: PipelineId,
        status: JobStatus,
    ) -> Result<Vec<Job>, DbError> {
        jobs::list_jobs_by_status(&self.pool, pipeline_id, status).await
    }

    async fn claim_job(&self, id: JobId) -> Result<bool, DbError> {
        jobs::claim_job(&self.pool, id).await
    }

    async fn complete_job(&self, id: JobId, output: Value) -> Result<Option<Job>, DbError> {
        jobs::complete_job(&self.pool, id, &output).await
    }

    async fn fail_job(&self, id: JobId, message: &str, retry: bool) -> Result<Option<Job>, DbError> {
        jobs::fail_job(&self.pool, id, message, retry).await
    }

    async fn cancel_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        jobs::cancel_jobs(&self.pool, pipeline_id).await
    }

    async fn delete_jobs(&self, pipeline_id: PipelineId) -> Result<u64, DbError> {
        jobs::delete_jobs(&self.pool, pipeline_id).await
    }
}

#[async_trait]
impl PipelineRepository for PgStore {
    async fn create_pipeline(&self, workflow_id: &str) -> Result<Pipeline, DbError> {
        pipelines::insert_pipeline(&self.pool, workflow_id).await
    }

    async fn get_pipeline(&self, id: PipelineId) -> Result<Pipeline, DbError> {
        pipelines::get_pipeline(&self.pool, id).await
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), DbError> {
        pipelines::update_pipeline(&self.pool, pipeline).await
    }
}

#[async_trait]
impl WorkflowDefinitions for PgStore {
    async fn workflow_definition(&self, id: &str) -> Result<Option<Value>, DbError> {
        Ok(workflows::find_workflow(&self.pool, id).await?.map(|row| row.definition))
    }
}
