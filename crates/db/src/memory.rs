//! In-memory implementation of the repository traits.
//!
//! Used by tests and by one-shot CLI runs.  A single mutex guards all state,
//! which makes `claim_job` trivially atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::models::{Job, JobId, JobStatus, NewJob, Pipeline, PipelineId};
use crate::repository::{JobRepository, PipelineRepository, WorkflowDefinitions};
use crate::DbError;

#[derive(Debug, Default)]
struct State {
    pipelines: HashMap<PipelineId, Pipeline>,
    jobs: HashMap<JobId, Job>,
    /// Creation order, so listings are stable.
    job_order: Vec<JobId>,
    workflows: HashMap<String, Value>,
    /// When set, the n-th subsequent `create_job` call fails.
    fail_create_after: Option<usize>,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition for [`WorkflowDefinitions`] lookups.
    pub fn insert_workflow(&self, id: impl Into<String>, definition: Value) {
        self.lock().workflows.insert(id.into(), definition);
    }

    /// Make `create_job` fail once `successes` more jobs have been created.
    pub fn fail_job_creation_after(&self, successes: usize) {
        self.lock().fail_create_after = Some(successes);
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn jobs_of(&self, pipeline_id: PipelineId) -> impl Iterator<Item = &Job> + '_ {
        self.job_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(move |job| job.pipeline_id == pipeline_id)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, DbError> {
        let mut state = self.lock();
        if let Some(remaining) = state.fail_create_after.as_mut() {
            if *remaining == 0 {
                return Err(DbError::Unavailable("job creation rejected".into()));
            }
            *remaining -= 1;
        }

        let job = Job::from_new(JobId::new_v4(), job);
        state.job_order.push(job.id);
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn save_job(&self, job: &Job) -> Result<(), DbError> {
        let mut state = self.lock();
        let slot = state.jobs.get_mut(&job.id).ok_or(DbError::NotFound)?;
        let mut updated = job.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Job, DbError> {
        self.lock().jobs.get(&id).cloned().ok_or(DbError::NotFound)
    }

    async fn load_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        Ok(self.lock().jobs_of(pipeline_id).cloned().collect())
    }

    async fn load_jobs_by_status(
        &self,
        pipeline_id: PipelineId,
        status: JobStatus,
    ) -> Result<Vec<Job>, DbError> {
        Ok(self
            .lock()
            .jobs_of(pipeline_id)
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn claim_job(&self, id: JobId) -> Result<bool, DbError> {
        let mut state = self.lock();
        let job = state.jobs.get_mut(&id).ok_or(DbError::NotFound)?;
        if job.status != JobStatus::Pending {
            debug!(job_id = %id, status = %job.status, "claim lost");
            return Ok(false);
        }
        let now = Utc::now();
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn complete_job(&self, id: JobId, output: Value) -> Result<Option<Job>, DbError> {
        let mut state = self.lock();
        let job = state.jobs.get_mut(&id).ok_or(DbError::NotFound)?;
        if job.status != JobStatus::Running {
            debug!(job_id = %id, status = %job.status, "completion dropped");
            return Ok(None);
        }
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.output_data = Some(output);
        job.error_message = None;
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn fail_job(&self, id: JobId, message: &str, retry: bool) -> Result<Option<Job>, DbError> {
        let mut state = self.lock();
        let job = state.jobs.get_mut(&id).ok_or(DbError::NotFound)?;
        if job.status != JobStatus::Running {
            debug!(job_id = %id, status = %job.status, "failure dropped");
            return Ok(None);
        }
        let now = Utc::now();
        if retry && job.can_retry() {
            job.status = JobStatus::Pending;
            job.retry_count += 1;
            job.started_at = None;
            job.completed_at = None;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
        }
        job.error_message = Some(message.to_owned());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn cancel_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        let mut state = self.lock();
        let State { jobs, job_order, .. } = &mut *state;
        let now = Utc::now();
        let mut cancelled = Vec::new();
        for id in job_order.iter() {
            let Some(job) = jobs.get_mut(id) else { continue };
            if job.pipeline_id != pipeline_id || job.status.is_terminal() {
                continue;
            }
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            job.updated_at = now;
            cancelled.push(job.clone());
        }
        Ok(cancelled)
    }

    async fn delete_jobs(&self, pipeline_id: PipelineId) -> Result<u64, DbError> {
        let mut state = self.lock();
        let doomed: Vec<JobId> = state.jobs_of(pipeline_id).map(|job| job.id).collect();
        for id in &doomed {
            state.jobs.remove(id);
        }
        state.job_order.retain(|id| !doomed.contains(id));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl PipelineRepository for MemoryStore {
    async fn create_pipeline(&self, workflow_id: &str) -> Result<Pipeline, DbError> {
        let pipeline = Pipeline::new(PipelineId::new_v4(), workflow_id);
        self.lock().pipelines.insert(pipeline.id, pipeline.clone());
        Ok(pipeline)
    }

    async fn get_pipeline(&self, id: PipelineId) -> Result<Pipeline, DbError> {
        self.lock().pipelines.get(&id).cloned().ok_or(DbError::NotFound)
    }

    async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<(), DbError> {
        let mut state = self.lock();
        let slot = state.pipelines.get_mut(&pipeline.id).ok_or(DbError::NotFound)?;
        let mut updated = pipeline.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }
}

#[async_trait]
impl WorkflowDefinitions for MemoryStore {
    async fn workflow_definition(&self, id: &str) -> Result<Option<Value>, DbError> {
        Ok(self.lock().workflows.get(id).cloned())
    }
}
