//! Engine-level error types.

use thiserror::Error;

use db::PipelineId;

use crate::models::NodeId;

/// Errors produced by job generation and pipeline execution.
///
/// Authoring problems (a bad workflow) and infrastructure problems (the
/// repository failed) must be surfaced differently; see
/// [`EngineError::is_authoring_error`].
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Authoring errors ------

    /// The pipeline refers to a workflow the source does not know.
    #[error("workflow '{0}' not found")]
    MissingWorkflow(String),

    /// The stored definition could not be parsed.
    #[error("workflow '{workflow_id}' is malformed: {reason}")]
    InvalidWorkflow {
        workflow_id: String,
        reason: String,
    },

    /// The workflow has no nodes to schedule.
    #[error("workflow '{0}' has no nodes")]
    EmptyWorkflow(String),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(NodeId),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: NodeId,
        side: &'static str,
    },

    /// The dependency graph contains a directed cycle.
    #[error("circular dependency detected at node '{node_id}': {}", format_path(.path))]
    CircularDependency {
        node_id: NodeId,
        /// Nodes on the cycle, in dependency order, ending where it started.
        path: Vec<NodeId>,
    },

    // ------ Infrastructure errors ------

    /// The repository failed while creating or wiring jobs.
    #[error("job materialization failed: {0}")]
    Materialization(#[source] db::DbError),

    /// Any other repository failure.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// `generate` was called on a pipeline that already has jobs.
    #[error("pipeline {0} already has jobs; use regenerate to replace them")]
    AlreadyGenerated(PipelineId),

    /// A scheduler invariant did not hold; indicates a bug, not bad input.
    #[error("internal scheduler error: {0}")]
    Internal(String),
}

impl EngineError {
    /// `true` when the workflow author has to fix something, `false` when
    /// the failure lies in the infrastructure.
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            Self::MissingWorkflow(_)
                | Self::InvalidWorkflow { .. }
                | Self::EmptyWorkflow(_)
                | Self::DuplicateNodeId(_)
                | Self::UnknownNodeReference { .. }
                | Self::CircularDependency { .. }
        )
    }
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
