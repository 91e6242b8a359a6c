//! Where job generation gets workflow definitions from.

use async_trait::async_trait;
use serde_json::Value;

use db::{MemoryStore, PgStore, WorkflowDefinitions};

use crate::models::Workflow;
use crate::EngineError;

/// Supplies `{nodes, edges}` for a workflow id.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// `Ok(None)` when no workflow with this id exists.
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, EngineError>;
}

/// A single, already-parsed workflow.
#[async_trait]
impl WorkflowSource for Workflow {
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        Ok((self.id == id).then(|| self.clone()))
    }
}

#[async_trait]
impl WorkflowSource for MemoryStore {
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        let definition = self.workflow_definition(id).await?;
        definition.map(|value| decode(id, value)).transpose()
    }
}

#[async_trait]
impl WorkflowSource for PgStore {
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        let definition = self.workflow_definition(id).await?;
        definition.map(|value| decode(id, value)).transpose()
    }
}

/// Parse a stored definition; the row id wins over any id inside the JSON.
fn decode(id: &str, value: Value) -> Result<Workflow, EngineError> {
    let mut workflow: Workflow = match value {
        Value::Object(mut map) => {
            map.entry("id").or_insert_with(|| Value::String(id.to_owned()));
            serde_json::from_value(Value::Object(map))
        }
        other => serde_json::from_value(other),
    }
    .map_err(|e| EngineError::InvalidWorkflow {
        workflow_id: id.to_owned(),
        reason: e.to_string(),
    })?;
    workflow.id = id.to_owned();
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_definitions_decode_without_embedded_id() {
        let store = MemoryStore::new();
        store.insert_workflow(
            "wf",
            json!({ "nodes": [{ "id": "a", "nodeTypeId": "passthrough" }], "edges": [] }),
        );
        let wf = store.load_workflow("wf").await.unwrap().unwrap();
        assert_eq!(wf.id, "wf");
        assert_eq!(wf.nodes.len(), 1);
        assert!(store.load_workflow("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_definition_is_an_authoring_error() {
        let store = MemoryStore::new();
        store.insert_workflow("wf", json!({ "nodes": "not a list" }));
        let err = store.load_workflow("wf").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidWorkflow { .. }));
        assert!(err.is_authoring_error());
    }
}
