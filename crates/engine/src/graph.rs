//! Edge index: per-node incoming and outgoing edges, classified.
//!
//! An edge is a *trigger* edge when its target handle ends with
//! `-input-trigger`; otherwise it is a *data* edge.  Its branch name is the
//! part of the source handle after `-output-`, provided the handle splits
//! into exactly two parts.  Malformed handles never fail; they simply yield
//! "data edge, no branch".

use std::collections::HashMap;

use tracing::warn;

pub use db::models::EdgeRecord;

use crate::models::{NodeId, WorkflowEdge, WorkflowNode};

const TRIGGER_SUFFIX: &str = "-input-trigger";
const BRANCH_SEPARATOR: &str = "-output-";

/// Incoming and outgoing edges of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeInfo {
    pub incoming: Vec<EdgeRecord>,
    pub outgoing: Vec<EdgeRecord>,
}

/// Edge index keyed by every node of the workflow.
#[derive(Debug, Clone, Default)]
pub struct EdgeIndex {
    order: Vec<NodeId>,
    entries: HashMap<NodeId, EdgeInfo>,
}

impl EdgeIndex {
    pub fn get(&self, node: &NodeId) -> Option<&EdgeInfo> {
        self.entries.get(node)
    }

    /// Entries in node input order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &EdgeInfo)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|info| (id, info)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Whether a target handle marks a trigger edge.
pub fn is_trigger_handle(target_handle: &str) -> bool {
    target_handle.ends_with(TRIGGER_SUFFIX)
}

/// Branch encoded in a source handle, or an empty string.
pub fn branch_name(source_handle: &str) -> String {
    let parts: Vec<&str> = source_handle.split(BRANCH_SEPARATOR).collect();
    match parts.as_slice() {
        [_, branch] => (*branch).to_owned(),
        _ => String::new(),
    }
}

/// Classify a single edge.
pub fn edge_record(edge: &WorkflowEdge) -> EdgeRecord {
    EdgeRecord {
        source: edge.source.clone(),
        target: edge.target.clone(),
        source_handle: edge.source_handle.clone(),
        target_handle: edge.target_handle.clone(),
        is_trigger: is_trigger_handle(&edge.target_handle),
        branch_name: branch_name(&edge.source_handle),
    }
}

/// Build the edge index in a single pass over `edges`.
///
/// Every node gets an entry, even without edges.  Each edge is recorded
/// twice: in its source's `outgoing` and its target's `incoming`.  Parallel
/// edges are kept as-is.
pub fn build_edge_index(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> EdgeIndex {
    let mut index = EdgeIndex {
        order: Vec::with_capacity(nodes.len()),
        entries: HashMap::with_capacity(nodes.len()),
    };
    for node in nodes {
        if index.entries.insert(node.id.clone(), EdgeInfo::default()).is_none() {
            index.order.push(node.id.clone());
        }
    }

    for edge in edges {
        if !index.entries.contains_key(&edge.source) || !index.entries.contains_key(&edge.target) {
            warn!(source = %edge.source, target = %edge.target, "skipping edge with unknown endpoint");
            continue;
        }
        let record = edge_record(edge);
        if let Some(info) = index.entries.get_mut(&edge.source) {
            info.outgoing.push(record.clone());
        }
        if let Some(info) = index.entries.get_mut(&edge.target) {
            info.incoming.push(record);
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, "passthrough")
    }

    #[test]
    fn branch_requires_exactly_two_parts() {
        assert_eq!(branch_name("gateway-output-true"), "true");
        assert_eq!(branch_name("gateway-output"), "");
        assert_eq!(branch_name("a-output-b-output-c"), "");
        assert_eq!(branch_name(""), "");
    }

    #[test]
    fn trigger_is_decided_by_target_handle_suffix() {
        assert!(is_trigger_handle("x-input-trigger"));
        assert!(!is_trigger_handle("x-input-trigger-2"));
        assert!(!is_trigger_handle("x-input-data"));
    }

    #[test]
    fn isolated_nodes_get_empty_entries() {
        let nodes = vec![node("a"), node("b"), node("lonely")];
        let edges = vec![WorkflowEdge::data("a", "b")];
        let index = build_edge_index(&nodes, &edges);

        assert_eq!(index.len(), 3);
        let lonely = index.get(&NodeId::new("lonely")).unwrap();
        assert!(lonely.incoming.is_empty() && lonely.outgoing.is_empty());
    }

    #[test]
    fn one_edge_lands_on_both_endpoints() {
        let nodes = vec![node("g"), node("x")];
        let edges = vec![WorkflowEdge::trigger("g", "x", Some("true"))];
        let index = build_edge_index(&nodes, &edges);

        let out = &index.get(&NodeId::new("g")).unwrap().outgoing;
        let inc = &index.get(&NodeId::new("x")).unwrap().incoming;
        assert_eq!(out.len(), 1);
        assert_eq!(out, inc);
        assert!(inc[0].is_trigger);
        assert_eq!(inc[0].branch_name, "true");
    }

    #[test]
    fn parallel_edges_are_preserved() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![WorkflowEdge::data("a", "b"), WorkflowEdge::data("a", "b")];
        let index = build_edge_index(&nodes, &edges);
        assert_eq!(index.get(&NodeId::new("b")).unwrap().incoming.len(), 2);
    }

    #[test]
    fn iteration_follows_node_order() {
        let nodes = vec![node("c"), node("a"), node("b")];
        let index = build_edge_index(&nodes, &[]);
        let ids: Vec<&str> = index.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
