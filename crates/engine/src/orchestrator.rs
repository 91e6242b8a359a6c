//! Pipeline run loop.
//!
//! `Orchestrator` drives a pipeline to completion:
//! 1. Asks the [`ReadinessEvaluator`] for runnable jobs.
//! 2. Claims each one through the repository (pending → running); a lost
//!    claim means another worker has it.
//! 3. Dispatches the job to the `ExecutableNode` registered for its type,
//!    feeding it the config snapshot plus upstream outputs.
//! 4. Reports the outcome: `completed` with output, back to `pending` while
//!    retries remain (`NodeError::Retryable`), or `failed`.
//!
//! The loop ends when nothing is ready and nothing is running.  Jobs left
//! pending at that point sat behind a branch that was not taken or behind a
//! failed dependency.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

use db::{
    Job, JobId, JobRepository, JobStatus, PipelineId, PipelineRepository, PipelineStatus,
};
use nodes::{ExecutionContext, NodeRegistry};

use crate::events::{EventSink, PipelineEvent};
use crate::models::NodeId;
use crate::readiness::{CompletedJobs, ReadinessEvaluator};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the run loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base delay for exponential back-off before a retried job is picked up.
    pub retry_base_delay: Duration,
    /// Sleep between polls while other workers still have jobs running.
    pub poll_interval: Duration,
    /// Upper bound on loop iterations for one `run` call.
    pub max_iterations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(250),
            max_iterations: 10_000,
        }
    }
}

/// Longest back-off before a retry.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`].
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(MAX_RETRY_DELAY).min(MAX_RETRY_DELAY)
}

// ---------------------------------------------------------------------------
// Reporting types
// ---------------------------------------------------------------------------

/// What happened to a job after a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `pending`; `attempt` is the new retry count.
    Retrying { attempt: u32 },
    Failed,
    /// The job was already terminal; nothing changed.
    Ignored,
}

/// Per-status job counts of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PipelineCounts {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut counts = Self { total: jobs.len(), ..Self::default() };
        for job in jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Overall status implied by the counts.
    pub fn status(&self) -> PipelineStatus {
        if self.total == 0 {
            PipelineStatus::Pending
        } else if self.running > 0 {
            PipelineStatus::Running
        } else if self.failed > 0 {
            PipelineStatus::Failed
        } else if self.cancelled > 0 {
            PipelineStatus::Cancelled
        } else if self.pending == 0 {
            PipelineStatus::Completed
        } else if self.completed > 0 {
            PipelineStatus::Running
        } else {
            PipelineStatus::Pending
        }
    }
}

/// Result of one [`Orchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pipeline_id: PipelineId,
    pub status: PipelineStatus,
    pub completed: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    /// Still pending when the run ended.
    pub not_reached: Vec<NodeId>,
    pub counts: PipelineCounts,
}

impl RunSummary {
    fn from_jobs(pipeline_id: PipelineId, status: PipelineStatus, jobs: &[Job]) -> Self {
        let with = |status: JobStatus| -> Vec<NodeId> {
            jobs.iter()
                .filter(|job| job.status == status)
                .map(|job| job.node_id.clone())
                .collect()
        };
        Self {
            pipeline_id,
            status,
            completed: with(JobStatus::Completed),
            failed: with(JobStatus::Failed),
            not_reached: with(JobStatus::Pending),
            counts: PipelineCounts::from_jobs(jobs),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    jobs: Arc<dyn JobRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    registry: NodeRegistry,
    events: Arc<dyn EventSink>,
    readiness: ReadinessEvaluator,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        registry: NodeRegistry,
        events: Arc<dyn EventSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let readiness = ReadinessEvaluator::new(jobs.clone());
        Self { jobs, pipelines, registry, events, readiness, config }
    }

    /// Run a generated pipeline until no job can make progress.
    ///
    /// # Errors
    /// Repository failures, or [`EngineError::Internal`] when the iteration
    /// bound is hit.  Node failures are recorded on their jobs, not returned.
    #[instrument(skip(self), fields(%pipeline_id))]
    pub async fn run(&self, pipeline_id: PipelineId) -> Result<RunSummary, EngineError> {
        let mut pipeline = self.pipelines.get_pipeline(pipeline_id).await?;
        if pipeline.status == PipelineStatus::Cancelled {
            warn!("pipeline is cancelled; not running");
            let jobs = self.jobs.load_jobs(pipeline_id).await?;
            return Ok(RunSummary::from_jobs(pipeline_id, pipeline.status, &jobs));
        }

        pipeline.status = PipelineStatus::Running;
        self.pipelines.save_pipeline(&pipeline).await?;
        info!(jobs = pipeline.job_ids.len(), "pipeline run started");

        let mut iterations = 0usize;
        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(EngineError::Internal(format!(
                    "pipeline {pipeline_id} did not settle within {} iterations",
                    self.config.max_iterations
                )));
            }

            let ready = self.readiness.get_ready_jobs(pipeline_id).await?;
            if ready.is_empty() {
                let running = self
                    .jobs
                    .load_jobs_by_status(pipeline_id, JobStatus::Running)
                    .await?;
                if running.is_empty() {
                    break;
                }
                debug!(running = running.len(), "waiting on jobs held by other workers");
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(ready = ready.len(), "dispatching ready jobs");
            for candidate in ready {
                if !self.jobs.claim_job(candidate.id).await? {
                    debug!(job_id = %candidate.id, "job claimed elsewhere");
                    continue;
                }
                let job = self.jobs.get_job(candidate.id).await?;
                self.dispatch(job).await?;
            }
        }

        // ------------------------------------------------------------------
        // Settle the pipeline status.
        // ------------------------------------------------------------------
        let jobs = self.jobs.load_jobs(pipeline_id).await?;
        let counts = PipelineCounts::from_jobs(&jobs);
        let mut pipeline = self.pipelines.get_pipeline(pipeline_id).await?;
        if pipeline.status != PipelineStatus::Cancelled {
            pipeline.status = if counts.failed > 0 {
                PipelineStatus::Failed
            } else {
                PipelineStatus::Completed
            };
            self.pipelines.save_pipeline(&pipeline).await?;
        }

        let summary = RunSummary::from_jobs(pipeline_id, pipeline.status, &jobs);
        info!(
            status = %summary.status,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            not_reached = summary.not_reached.len(),
            "pipeline run finished"
        );
        Ok(summary)
    }

    /// Execute one claimed job and record the outcome.
    async fn dispatch(&self, job: Job) -> Result<(), EngineError> {
        let Some(node) = self.registry.get(&job.node_type_id) else {
            let message = format!(
                "no executor registered for node type '{}'",
                job.node_type_id
            );
            error!(job_id = %job.id, node_id = %job.node_id, "{message}");
            self.report_failure(job.id, &message, false).await?;
            return Ok(());
        };

        let ctx = ExecutionContext {
            pipeline_id: job.pipeline_id.0,
            job_id: job.id.0,
            node_id: job.node_id.to_string(),
            attempt: job.retry_count,
        };
        let input = self.node_input(&job).await?;

        match node.execute(input, &ctx).await {
            Ok(output) => {
                self.report_completion(job.id, output).await?;
            }
            Err(err) => {
                let outcome = self
                    .report_failure(job.id, err.message(), err.is_retryable())
                    .await?;
                if let FailureOutcome::Retrying { attempt } = outcome {
                    tokio::time::sleep(retry_delay(self.config.retry_base_delay, attempt)).await;
                }
            }
        }
        Ok(())
    }

    /// `{ "config": <input_data>, "inputs": { <source node>: <output> } }`
    /// over every completed upstream source.
    async fn node_input(&self, job: &Job) -> Result<Value, EngineError> {
        let completed_jobs = self
            .jobs
            .load_jobs_by_status(job.pipeline_id, JobStatus::Completed)
            .await?;
        let completed = CompletedJobs::from_jobs(&completed_jobs);

        let mut inputs = Map::new();
        for edge in &job.metadata.incoming_edges {
            if let Some(source) = completed.get(&edge.source) {
                inputs.insert(
                    edge.source.to_string(),
                    source.output_data.clone().unwrap_or(Value::Null),
                );
            }
        }

        Ok(json!({ "config": job.input_data, "inputs": inputs }))
    }

    /// Record a successful execution of a `running` job.
    ///
    /// When the job is no longer running (e.g. cancelled meanwhile) nothing
    /// is written and the stored job is returned as it is.
    pub async fn report_completion(&self, job_id: JobId, output: Value) -> Result<Job, EngineError> {
        let Some(job) = self.jobs.complete_job(job_id, output).await? else {
            let job = self.jobs.get_job(job_id).await?;
            warn!(%job_id, status = %job.status, "ignoring completion of job that is not running");
            return Ok(job);
        };

        info!(%job_id, node_id = %job.node_id, "job completed");
        self.events.emit(PipelineEvent::JobCompleted { job: job.clone() });
        Ok(job)
    }

    /// Record a failed execution of a `running` job.
    ///
    /// A retryable failure with retries left sends the job back to
    /// `pending` and bumps `retry_count`; anything else marks it `failed`.
    /// A job that is no longer running is left alone.
    pub async fn report_failure(
        &self,
        job_id: JobId,
        message: &str,
        retryable: bool,
    ) -> Result<FailureOutcome, EngineError> {
        let Some(job) = self.jobs.fail_job(job_id, message, retryable).await? else {
            warn!(%job_id, "ignoring failure of job that is not running: {message}");
            return Ok(FailureOutcome::Ignored);
        };

        if job.status == JobStatus::Pending {
            warn!(
                %job_id,
                node_id = %job.node_id,
                attempt = job.retry_count,
                max_retries = job.max_retries,
                "job failed, will retry: {message}"
            );
            let attempt = job.retry_count;
            self.events.emit(PipelineEvent::JobRetried { job, error: message.to_owned() });
            return Ok(FailureOutcome::Retrying { attempt });
        }

        error!(%job_id, node_id = %job.node_id, retries = job.retry_count, "job failed: {message}");
        self.events.emit(PipelineEvent::JobFailed { job, error: message.to_owned() });
        Ok(FailureOutcome::Failed)
    }

    /// Cancel every non-terminal job and the pipeline itself.
    ///
    /// Running jobs are only marked; stopping their execution is up to the
    /// executor, whose later report is then dropped.
    #[instrument(skip(self), fields(%pipeline_id))]
    pub async fn cancel_pipeline(&self, pipeline_id: PipelineId) -> Result<usize, EngineError> {
        let mut pipeline = self.pipelines.get_pipeline(pipeline_id).await?;
        let cancelled = self.jobs.cancel_jobs(pipeline_id).await?.len();

        pipeline.status = PipelineStatus::Cancelled;
        self.pipelines.save_pipeline(&pipeline).await?;

        info!(cancelled, "pipeline cancelled");
        self.events.emit(PipelineEvent::PipelineCancelled { pipeline_id, cancelled_jobs: cancelled });
        Ok(cancelled)
    }

    /// Per-status job counts.
    pub async fn pipeline_counts(&self, pipeline_id: PipelineId) -> Result<PipelineCounts, EngineError> {
        let jobs = self.jobs.load_jobs(pipeline_id).await?;
        Ok(PipelineCounts::from_jobs(&jobs))
    }
}
