//! Cycle detection over the dependency graph.
//!
//! Depth-first search with an on-stack marker, walking from each dependency
//! to its dependents.  Roots are tried in graph order, so the reported cycle
//! is deterministic for a given input.

use std::collections::{HashMap, HashSet};

use crate::dependency::DependencyGraph;
use crate::models::NodeId;
use crate::EngineError;

/// Return `Ok(())` for a DAG, or the first cycle found.
///
/// # Errors
/// [`EngineError::CircularDependency`] naming the node where the back-edge
/// closed and the nodes on the cycle.
pub fn validate_acyclic(graph: &DependencyGraph) -> Result<(), EngineError> {
    let dependents = graph.dependents();
    let mut on_stack: HashSet<&NodeId> = HashSet::new();
    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut path: Vec<&NodeId> = Vec::new();

    for node in graph.nodes() {
        if visited.contains(node) {
            continue;
        }
        if let Some(cycle) = dfs(node, &dependents, &mut on_stack, &mut visited, &mut path) {
            let node_id = cycle.first().cloned().unwrap_or_else(|| node.clone());
            return Err(EngineError::CircularDependency { node_id, path: cycle });
        }
    }
    Ok(())
}

fn dfs<'a>(
    node: &'a NodeId,
    dependents: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
    on_stack: &mut HashSet<&'a NodeId>,
    visited: &mut HashSet<&'a NodeId>,
    path: &mut Vec<&'a NodeId>,
) -> Option<Vec<NodeId>> {
    on_stack.insert(node);
    path.push(node);

    if let Some(next) = dependents.get(node) {
        for &child in next {
            if on_stack.contains(child) {
                let start = path.iter().position(|n| *n == child).unwrap_or(0);
                let mut cycle: Vec<NodeId> = path[start..].iter().map(|n| (*n).clone()).collect();
                cycle.push(child.clone());
                return Some(cycle);
            }
            if !visited.contains(child) {
                if let Some(cycle) = dfs(child, dependents, on_stack, visited, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    on_stack.remove(node);
    visited.insert(node);
    None
}
