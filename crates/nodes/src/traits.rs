//! The `ExecutableNode` trait: the contract every node executor must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::NodeError;

/// Identifies the job being executed.
///
/// Defined here (in the nodes crate) so executors do not need to depend on
/// the persistence layer.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub pipeline_id: Uuid,
    pub job_id: Uuid,
    /// Workflow node the job was generated from.
    pub node_id: String,
    /// Zero on the first attempt, incremented per retry.
    pub attempt: u32,
}

/// The core executor trait.
///
/// `input` is `{ "config": <node config>, "inputs": { <upstream node id>: <output> } }`.
/// Gateway-style nodes report the branches they took by writing an
/// `active_branches` string (comma-separated) into their output.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError>;
}
