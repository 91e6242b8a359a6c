//! `MockNode`: a test double for `ExecutableNode`.
//!
//! Records every input it receives and returns a programmer-specified
//! result.  Can also emit `active_branches` to stand in for a gateway.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error `times` times, then return the value.
    FlakyThenReturn { times: usize, value: Value },
    /// Always fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

#[derive(Debug, Clone)]
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    pub behaviour: MockBehaviour,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    fn with(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with(name, MockBehaviour::ReturnValue(value))
    }

    /// A gateway stand-in that activates the given comma-separated branches.
    pub fn branching(name: impl Into<String>, active_branches: &str) -> Self {
        Self::returning(name, json!({ "active_branches": active_branches }))
    }

    pub fn flaky(name: impl Into<String>, times: usize, value: Value) -> Self {
        Self::with(name, MockBehaviour::FlakyThenReturn { times, value })
    }

    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::FailFatal(msg.into()))
    }

    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }

    /// Inputs received so far.
    pub fn inputs(&self) -> Vec<Value> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn output(&self, value: &Value) -> Value {
        // Merge the node's own name in so tests can trace data flow.
        let mut out = json!({ "node": self.name });
        if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), value.as_object()) {
            for (k, val) in v_obj {
                out_obj.insert(k.clone(), val.clone());
            }
        }
        out
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let seen = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| NodeError::Fatal("mock call log poisoned".into()))?;
            calls.push(input);
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(self.output(v)),
            MockBehaviour::FlakyThenReturn { times, value } => {
                if seen <= *times {
                    Err(NodeError::Retryable(format!("{} flaked on call {seen}", self.name)))
                } else {
                    Ok(self.output(value))
                }
            }
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg)     => Err(NodeError::Fatal(msg.clone())),
        }
    }
}
