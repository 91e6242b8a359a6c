//! Turns a validated, scheduled workflow into persisted jobs.
//!
//! Two passes: every job is created first so it has an id, then dependency
//! references are wired and saved.  A repository failure aborts the run;
//! jobs created before the failure are left in place.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument};

use db::{Job, JobMetadata, JobRepository, NewJob, Pipeline, PipelineRepository};

use crate::dependency::DependencyGraph;
use crate::events::{EventSink, PipelineEvent};
use crate::graph::EdgeIndex;
use crate::models::{NodeId, WorkflowNode};
use crate::schedule::Schedule;
use crate::EngineError;

pub struct JobMaterializer {
    jobs: Arc<dyn JobRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    events: Arc<dyn EventSink>,
}

impl JobMaterializer {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { jobs, pipelines, events }
    }

    /// Create one pending job per node and attach them to `pipeline`.
    ///
    /// Returns the jobs in node order, with `dependent_jobs` filled in.
    ///
    /// # Errors
    /// [`EngineError::Materialization`] wrapping the first repository
    /// failure; [`EngineError::Internal`] if a node is missing from the
    /// schedule or a dependency has no job.
    #[instrument(skip_all, fields(pipeline_id = %pipeline.id, nodes = nodes.len()))]
    pub async fn materialize(
        &self,
        pipeline: &mut Pipeline,
        nodes: &[WorkflowNode],
        edge_index: &EdgeIndex,
        graph: &DependencyGraph,
        schedule: &Schedule,
    ) -> Result<Vec<Job>, EngineError> {
        // ------------------------------------------------------------------
        // Pass 1: create every job.
        // ------------------------------------------------------------------
        let mut created: Vec<Job> = Vec::with_capacity(nodes.len());
        let mut by_node: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let priority = schedule.priority(&node.id).ok_or_else(|| {
                EngineError::Internal(format!("node '{}' missing from schedule", node.id))
            })?;
            let edges = edge_index.get(&node.id).cloned().unwrap_or_default();

            let new_job = NewJob {
                pipeline_id: pipeline.id,
                node_id: node.id.clone(),
                node_type_id: node.node_type_id.clone(),
                label: node.label.clone(),
                priority,
                input_data: Value::Object(node.config.clone()),
                metadata: JobMetadata {
                    pipeline_id: pipeline.id,
                    incoming_edges: edges.incoming,
                    outgoing_edges: edges.outgoing,
                },
                max_retries: node.max_retries,
            };

            let job = self
                .jobs
                .create_job(new_job)
                .await
                .map_err(EngineError::Materialization)?;
            debug!(job_id = %job.id, node_id = %job.node_id, priority, "job created");

            by_node.insert(node.id.clone(), created.len());
            created.push(job);
        }

        // ------------------------------------------------------------------
        // Pass 2: wire dependency references now that every job has an id.
        // ------------------------------------------------------------------
        for position in 0..created.len() {
            let deps = graph.dependencies(&created[position].node_id);
            if deps.is_empty() {
                continue;
            }

            let mut dependent_jobs = Vec::with_capacity(deps.len());
            for dep in deps {
                let index = by_node.get(dep).ok_or_else(|| {
                    EngineError::Internal(format!("dependency '{dep}' has no job"))
                })?;
                dependent_jobs.push(created[*index].id);
            }

            let job = &mut created[position];
            job.dependent_jobs = dependent_jobs;
            self.jobs
                .save_job(job)
                .await
                .map_err(EngineError::Materialization)?;
        }

        // ------------------------------------------------------------------
        // Attach to the pipeline.
        // ------------------------------------------------------------------
        pipeline.job_ids.extend(created.iter().map(|job| job.id));
        self.pipelines
            .save_pipeline(pipeline)
            .await
            .map_err(EngineError::Materialization)?;

        for job in &created {
            self.events.emit(PipelineEvent::JobCreated { job: job.clone() });
        }
        self.events.emit(PipelineEvent::JobsGenerated {
            pipeline: pipeline.clone(),
            job_count: created.len(),
        });

        info!(jobs = created.len(), "pipeline jobs materialized");
        Ok(created)
    }
}
