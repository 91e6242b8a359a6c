//! Dependency graph: node → upstream nodes it waits on.

use std::collections::HashMap;

use crate::models::{NodeId, WorkflowEdge, WorkflowNode};

/// Upstream dependencies per node.
///
/// Every node of the workflow is a key.  Dependency lists are de-duplicated
/// and keep first-seen order; iteration follows node input order, which
/// keeps cycle detection and scheduling deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    order: Vec<NodeId>,
    dependencies: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    /// One entry per node; each edge adds its source to its target's set.
    /// A self-loop is recorded as such and left to the cycle check.
    pub fn build(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            graph.add_node(node.id.clone());
        }
        for edge in edges {
            graph.add_dependency(&edge.target, edge.source.clone());
        }
        graph
    }

    pub fn add_node(&mut self, node: NodeId) {
        if !self.dependencies.contains_key(&node) {
            self.order.push(node.clone());
            self.dependencies.insert(node, Vec::new());
        }
    }

    /// Record that `node` depends on `dependency`.  Unknown `node`s are
    /// ignored.
    pub fn add_dependency(&mut self, node: &NodeId, dependency: NodeId) {
        if let Some(deps) = self.dependencies.get_mut(node) {
            if !deps.contains(&dependency) {
                deps.push(dependency);
            }
        }
    }

    pub fn dependencies(&self, node: &NodeId) -> &[NodeId] {
        self.dependencies.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.dependencies.contains_key(node)
    }

    /// Nodes in input order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }

    /// `(node, dependencies)` in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &[NodeId])> {
        self.order.iter().map(|id| (id, self.dependencies(id)))
    }

    /// Reverse relation: dependency → dependents, keyed by every node.
    pub fn dependents(&self) -> HashMap<&NodeId, Vec<&NodeId>> {
        let mut reverse: HashMap<&NodeId, Vec<&NodeId>> =
            self.order.iter().map(|id| (id, Vec::new())).collect();
        for (node, deps) in self.iter() {
            for dep in deps {
                reverse.entry(dep).or_default().push(node);
            }
        }
        reverse
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<WorkflowNode> {
        ids.iter().map(|id| WorkflowNode::new(*id, "passthrough")).collect()
    }

    #[test]
    fn every_node_is_a_key() {
        let graph = DependencyGraph::build(&nodes(&["a", "b", "c"]), &[WorkflowEdge::data("a", "b")]);
        assert_eq!(graph.len(), 3);
        assert!(graph.dependencies(&NodeId::new("c")).is_empty());
        assert_eq!(graph.dependencies(&NodeId::new("b")), &[NodeId::new("a")]);
    }

    #[test]
    fn parallel_edges_collapse_into_one_dependency() {
        let edges = vec![
            WorkflowEdge::data("a", "b"),
            WorkflowEdge::trigger("a", "b", None),
        ];
        let graph = DependencyGraph::build(&nodes(&["a", "b"]), &edges);
        assert_eq!(graph.dependencies(&NodeId::new("b")).len(), 1);
    }

    #[test]
    fn self_loop_is_recorded() {
        let graph = DependencyGraph::build(&nodes(&["a"]), &[WorkflowEdge::data("a", "a")]);
        assert_eq!(graph.dependencies(&NodeId::new("a")), &[NodeId::new("a")]);
    }

    #[test]
    fn dependents_invert_the_relation() {
        let edges = vec![WorkflowEdge::data("a", "b"), WorkflowEdge::data("a", "c")];
        let graph = DependencyGraph::build(&nodes(&["a", "b", "c"]), &edges);
        let reverse = graph.dependents();
        let a = NodeId::new("a");
        let names: Vec<&str> = reverse[&a].iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
