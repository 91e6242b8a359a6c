//! Job generation: workflow → validated graph → schedule → persisted jobs.
//!
//! Structural problems (missing or empty workflow, duplicate ids, dangling
//! edges, cycles) abort before any job is created.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use db::{Job, JobRepository, Pipeline, PipelineId, PipelineRepository};

use crate::cycle::validate_acyclic;
use crate::dependency::DependencyGraph;
use crate::events::EventSink;
use crate::graph::{build_edge_index, EdgeIndex};
use crate::materialize::JobMaterializer;
use crate::models::Workflow;
use crate::schedule::{compute_order, Schedule};
use crate::source::WorkflowSource;
use crate::EngineError;

/// Everything derived from a workflow before persistence.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub edge_index: EdgeIndex,
    pub graph: DependencyGraph,
    pub schedule: Schedule,
}

/// Validate a workflow and compute its plan without touching storage.
///
/// # Errors
/// [`EngineError::EmptyWorkflow`], [`EngineError::DuplicateNodeId`],
/// [`EngineError::UnknownNodeReference`] or
/// [`EngineError::CircularDependency`].
pub fn plan(workflow: &Workflow) -> Result<ExecutionPlan, EngineError> {
    if workflow.nodes.is_empty() {
        return Err(EngineError::EmptyWorkflow(workflow.id.clone()));
    }

    let mut seen = HashSet::with_capacity(workflow.nodes.len());
    for node in &workflow.nodes {
        if !seen.insert(&node.id) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    for edge in &workflow.edges {
        if !seen.contains(&edge.source) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.source.clone(),
                side: "source",
            });
        }
        if !seen.contains(&edge.target) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.target.clone(),
                side: "target",
            });
        }
    }

    let edge_index = build_edge_index(&workflow.nodes, &workflow.edges);
    let graph = DependencyGraph::build(&workflow.nodes, &workflow.edges);
    validate_acyclic(&graph)?;
    let schedule = compute_order(&graph)?;

    Ok(ExecutionPlan { edge_index, graph, schedule })
}

/// Generates the jobs of a pipeline from its workflow.
pub struct JobGenerator {
    workflows: Arc<dyn WorkflowSource>,
    jobs: Arc<dyn JobRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    materializer: JobMaterializer,
}

impl JobGenerator {
    pub fn new(
        workflows: Arc<dyn WorkflowSource>,
        jobs: Arc<dyn JobRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let materializer = JobMaterializer::new(jobs.clone(), pipelines.clone(), events);
        Self { workflows, jobs, pipelines, materializer }
    }

    /// Create a pipeline for `workflow_id` and generate its jobs.
    pub async fn create_pipeline(&self, workflow_id: &str) -> Result<(Pipeline, Vec<Job>), EngineError> {
        let pipeline = self.pipelines.create_pipeline(workflow_id).await?;
        let jobs = self.generate(pipeline.id).await?;
        let pipeline = self.pipelines.get_pipeline(pipeline.id).await?;
        Ok((pipeline, jobs))
    }

    /// Generate jobs for an existing pipeline that has none yet.
    ///
    /// # Errors
    /// [`EngineError::AlreadyGenerated`] when the pipeline already has jobs
    /// (including leftovers of a failed run); use [`Self::regenerate`].
    /// Authoring errors from [`plan`], [`EngineError::MissingWorkflow`] when
    /// the source has no such workflow, and [`EngineError::Materialization`]
    /// for repository failures while writing jobs.
    #[instrument(skip(self), fields(%pipeline_id))]
    pub async fn generate(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, EngineError> {
        let mut pipeline = self.pipelines.get_pipeline(pipeline_id).await?;
        if !pipeline.job_ids.is_empty() || !self.jobs.load_jobs(pipeline_id).await?.is_empty() {
            return Err(EngineError::AlreadyGenerated(pipeline_id));
        }

        let workflow = self
            .workflows
            .load_workflow(&pipeline.workflow_id)
            .await?
            .ok_or_else(|| EngineError::MissingWorkflow(pipeline.workflow_id.clone()))?;

        let plan = plan(&workflow)?;
        info!(
            workflow_id = %workflow.id,
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            "workflow validated, materializing jobs"
        );

        self.materializer
            .materialize(&mut pipeline, &workflow.nodes, &plan.edge_index, &plan.graph, &plan.schedule)
            .await
    }

    /// Delete the pipeline's jobs, then generate them afresh.
    #[instrument(skip(self), fields(%pipeline_id))]
    pub async fn regenerate(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, EngineError> {
        self.clear(pipeline_id).await?;
        self.generate(pipeline_id).await
    }

    /// Remove every job of the pipeline and reset its job list.
    pub async fn clear(&self, pipeline_id: PipelineId) -> Result<u64, EngineError> {
        let mut pipeline = self.pipelines.get_pipeline(pipeline_id).await?;
        let removed = self.jobs.delete_jobs(pipeline_id).await?;
        if removed > 0 {
            warn!(%pipeline_id, removed, "cleared existing pipeline jobs");
        }
        pipeline.job_ids.clear();
        pipeline.status = db::PipelineStatus::Pending;
        self.pipelines.save_pipeline(&pipeline).await?;
        Ok(removed)
    }
}
