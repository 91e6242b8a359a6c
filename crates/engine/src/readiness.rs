//! Which pending jobs may run next.
//!
//! Gating rules, per pending job:
//! - no dependency jobs: ready;
//! - any incoming trigger edges: ready as soon as **one** trigger is
//!   satisfied, i.e. its source job completed and, if the edge names a
//!   branch, that branch is among the source's `active_branches`.  Data edges
//!   do not gate in this mode;
//! - otherwise: ready once **every** data edge's source job completed.
//!
//! Evaluation only reads job state, so calling it again without a state
//! change returns the same set.  Claiming a candidate is the repository's
//! job (`JobRepository::claim_job`).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{instrument, trace};

use db::{EdgeRecord, Job, JobRepository, JobStatus, PipelineId};

use crate::models::NodeId;
use crate::EngineError;

/// Completed jobs of one pipeline, looked up by node.
#[derive(Debug, Default)]
pub struct CompletedJobs<'a> {
    by_node: HashMap<&'a NodeId, &'a Job>,
}

impl<'a> CompletedJobs<'a> {
    /// Index the `completed` jobs among `jobs`; other statuses are ignored.
    pub fn from_jobs(jobs: &'a [Job]) -> Self {
        Self {
            by_node: jobs
                .iter()
                .filter(|job| job.status == JobStatus::Completed)
                .map(|job| (&job.node_id, job))
                .collect(),
        }
    }

    pub fn get(&self, node: &NodeId) -> Option<&'a Job> {
        self.by_node.get(node).copied()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.by_node.contains_key(node)
    }
}

/// Branches a completed job activated, lower-cased.
///
/// Read from `output_data.active_branches`: a comma-separated string, or an
/// array of strings.
pub fn active_branches(job: &Job) -> Vec<String> {
    let Some(raw) = job.output_data.as_ref().and_then(|out| out.get("active_branches")) else {
        return Vec::new();
    };
    let parts: Vec<&str> = match raw {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    parts
        .into_iter()
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Whether one trigger edge lets its target run.
///
/// An edge without a branch name is satisfied by source completion alone.
pub fn trigger_satisfied(edge: &EdgeRecord, completed: &CompletedJobs<'_>) -> bool {
    let Some(source) = completed.get(&edge.source) else {
        return false;
    };
    if !edge.has_branch() {
        return true;
    }
    let wanted = edge.branch_name.trim().to_lowercase();
    active_branches(source).iter().any(|branch| *branch == wanted)
}

/// Apply the gating rules to a single pending job.
pub fn is_ready(job: &Job, completed: &CompletedJobs<'_>) -> bool {
    if job.dependent_jobs.is_empty() {
        return true;
    }

    let (triggers, data): (Vec<&EdgeRecord>, Vec<&EdgeRecord>) = job
        .metadata
        .incoming_edges
        .iter()
        .partition(|edge| edge.is_trigger);

    if !triggers.is_empty() {
        return triggers.iter().any(|edge| trigger_satisfied(edge, completed));
    }

    data.iter().all(|edge| completed.contains(&edge.source))
}

/// Proposes runnable jobs for a pipeline.
#[derive(Clone)]
pub struct ReadinessEvaluator {
    jobs: Arc<dyn JobRepository>,
}

impl ReadinessEvaluator {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    /// Pending jobs whose dependencies are met, lowest priority value first.
    #[instrument(skip(self), fields(%pipeline_id))]
    pub async fn get_ready_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, EngineError> {
        let pending = self
            .jobs
            .load_jobs_by_status(pipeline_id, JobStatus::Pending)
            .await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let completed_jobs = self
            .jobs
            .load_jobs_by_status(pipeline_id, JobStatus::Completed)
            .await?;
        let completed = CompletedJobs::from_jobs(&completed_jobs);

        let mut ready: Vec<Job> = pending
            .into_iter()
            .filter(|job| {
                let ok = is_ready(job, &completed);
                if !ok {
                    trace!(node_id = %job.node_id, "dependencies not met");
                }
                ok
            })
            .collect();
        ready.sort_by_key(|job| job.priority);
        Ok(ready)
    }
}
