//! Execution order and priorities (Kahn's algorithm).
//!
//! Priority is a tie-break heuristic only: `rank * 10 + dependency_count * 5`,
//! lower runs first.  Actual ordering is guaranteed by dependency
//! completion, not by priority.

use std::collections::{HashMap, VecDeque};

use crate::dependency::DependencyGraph;
use crate::models::NodeId;
use crate::EngineError;

const RANK_WEIGHT: i64 = 10;
const DEPENDENCY_WEIGHT: i64 = 5;

/// Rank and priority of every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<NodeId>,
    ranks: HashMap<NodeId, usize>,
    priorities: HashMap<NodeId, i64>,
}

impl Schedule {
    /// Position of `node` in execution order, starting at 0.
    pub fn rank(&self, node: &NodeId) -> Option<usize> {
        self.ranks.get(node).copied()
    }

    pub fn priority(&self, node: &NodeId) -> Option<i64> {
        self.priorities.get(node).copied()
    }

    /// Nodes sorted by rank.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub fn priority_for(rank: usize, dependency_count: usize) -> i64 {
    let rank = i64::try_from(rank).unwrap_or(i64::MAX / RANK_WEIGHT);
    let deps = i64::try_from(dependency_count).unwrap_or(i64::MAX / DEPENDENCY_WEIGHT);
    rank.saturating_mul(RANK_WEIGHT)
        .saturating_add(deps.saturating_mul(DEPENDENCY_WEIGHT))
}

/// Compute ranks and priorities for an acyclic graph.
///
/// Zero in-degree nodes are seeded in graph order and processed FIFO, so
/// ties keep input order.
///
/// # Errors
/// [`EngineError::Internal`] if the queue does not drain, which only
/// happens if the graph was not checked for cycles first.
pub fn compute_order(graph: &DependencyGraph) -> Result<Schedule, EngineError> {
    let dependents = graph.dependents();
    let mut in_degree: HashMap<&NodeId, usize> = graph
        .iter()
        .map(|(node, deps)| (node, deps.len()))
        .collect();

    let mut queue: VecDeque<&NodeId> = graph
        .nodes()
        .iter()
        .filter(|node| in_degree.get(node).copied() == Some(0))
        .collect();

    let mut schedule = Schedule {
        order: Vec::with_capacity(graph.len()),
        ranks: HashMap::with_capacity(graph.len()),
        priorities: HashMap::with_capacity(graph.len()),
    };

    while let Some(node) = queue.pop_front() {
        let rank = schedule.order.len();
        let priority = priority_for(rank, graph.dependencies(node).len());
        schedule.order.push(node.clone());
        schedule.ranks.insert(node.clone(), rank);
        schedule.priorities.insert(node.clone(), priority);

        for &dependent in dependents.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if schedule.order.len() != graph.len() {
        return Err(EngineError::Internal(format!(
            "topological sort scheduled {} of {} nodes",
            schedule.order.len(),
            graph.len()
        )));
    }

    Ok(schedule)
}
