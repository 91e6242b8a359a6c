//! Workflow description as supplied by the editor.
//!
//! These are the only inputs job generation consumes: nodes with their type
//! and config, and edges with their handle strings.  Field names accept both
//! snake_case and the editor's camelCase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use db::models::{NodeId, DEFAULT_MAX_RETRIES};

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique within the workflow; edges refer to nodes by this id.
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    /// Key into the executor registry.
    #[serde(alias = "nodeTypeId")]
    pub node_type_id: String,
    /// Opaque settings handed to the executor.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl WorkflowNode {
    pub fn new(id: impl Into<NodeId>, node_type_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            node_type_id: node_type_id.into(),
            config: Map::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowEdge
// ---------------------------------------------------------------------------

/// Directed connection between an output handle and an input handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "sourceNodeId")]
    pub source: NodeId,
    #[serde(alias = "targetNodeId")]
    pub target: NodeId,
    /// `<node>-output-<branch>` names the branch this edge leaves from.
    #[serde(default, alias = "sourceHandle")]
    pub source_handle: String,
    /// `…-input-trigger` marks a control-flow edge.
    #[serde(default, alias = "targetHandle")]
    pub target_handle: String,
}

impl WorkflowEdge {
    /// A plain data edge.
    pub fn data(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let (source, target) = (source.into(), target.into());
        Self {
            id: None,
            source_handle: format!("{source}-output"),
            target_handle: format!("{target}-input-data"),
            source,
            target,
        }
    }

    /// A trigger edge, optionally leaving from a named branch.
    pub fn trigger(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        branch: Option<&str>,
    ) -> Self {
        let (source, target) = (source.into(), target.into());
        Self {
            id: None,
            source_handle: match branch {
                Some(branch) => format!("{source}-output-{branch}"),
                None => format!("{source}-trigger"),
            },
            target_handle: format!("{target}-input-trigger"),
            source,
            target,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            nodes,
            edges,
        }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_json_with_camel_case_fields_deserialises() {
        let raw = r#"{
            "id": "wf",
            "nodes": [
                { "id": "a", "nodeTypeId": "passthrough", "config": { "x": 1 } },
                { "id": "b", "node_type_id": "gateway", "maxRetries": 0 }
            ],
            "edges": [
                { "sourceNodeId": "a", "targetNodeId": "b",
                  "sourceHandle": "a-output-data", "targetHandle": "b-input-trigger" }
            ]
        }"#;
        let wf = Workflow::from_json(raw).unwrap();
        assert_eq!(wf.nodes[0].max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(wf.nodes[1].max_retries, 0);
        assert_eq!(wf.nodes[0].config["x"], 1);
        assert_eq!(wf.edges[0].target_handle, "b-input-trigger");
        assert!(wf.edges[0].id.is_none());
    }

    #[test]
    fn edge_helpers_encode_handles() {
        let e = WorkflowEdge::trigger("g", "x", Some("true"));
        assert_eq!(e.source_handle, "g-output-true");
        assert_eq!(e.target_handle, "x-input-trigger");

        let d = WorkflowEdge::data("a", "b");
        assert!(!d.target_handle.ends_with("-input-trigger"));
    }
}
