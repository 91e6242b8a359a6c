//! `engine` crate: workflow graph analysis, job generation, readiness and the
//! pipeline run loop.

pub mod cycle;
pub mod dependency;
pub mod error;
pub mod events;
pub mod generator;
pub mod graph;
pub mod materialize;
pub mod models;
pub mod orchestrator;
pub mod readiness;
pub mod schedule;
pub mod source;

pub use cycle::validate_acyclic;
pub use dependency::DependencyGraph;
pub use error::EngineError;
pub use events::{EventSink, MemoryEventSink, PipelineEvent, TracingEventSink};
pub use generator::{plan, ExecutionPlan, JobGenerator};
pub use graph::{build_edge_index, EdgeIndex, EdgeInfo};
pub use materialize::JobMaterializer;
pub use models::{NodeId, Workflow, WorkflowEdge, WorkflowNode};
pub use orchestrator::{
    FailureOutcome, Orchestrator, OrchestratorConfig, PipelineCounts, RunSummary,
};
pub use readiness::{is_ready, CompletedJobs, ReadinessEvaluator};
pub use schedule::{compute_order, Schedule};
pub use source::WorkflowSource;

#[cfg(test)]
mod pipeline_tests;
