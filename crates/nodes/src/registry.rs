//! Maps node type ids to executor implementations.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin::{GatewayNode, PassthroughNode};
use crate::ExecutableNode;

#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn ExecutableNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `passthrough` and `gateway` nodes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PassthroughNode::TYPE_ID, Arc::new(PassthroughNode));
        registry.register(GatewayNode::TYPE_ID, Arc::new(GatewayNode));
        registry
    }

    /// Register (or replace) the executor for `node_type_id`.
    pub fn register(&mut self, node_type_id: impl Into<String>, node: Arc<dyn ExecutableNode>) {
        self.nodes.insert(node_type_id.into(), node);
    }

    pub fn get(&self, node_type_id: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.nodes.get(node_type_id).cloned()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.nodes.keys().collect();
        types.sort();
        f.debug_struct("NodeRegistry").field("types", &types).finish()
    }
}
