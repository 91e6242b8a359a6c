//! Built-in node executors.
//!
//! - `passthrough` echoes its config and upstream inputs.
//! - `gateway` evaluates one condition and activates the `true` or `false`
//!   branch through `active_branches`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Returns `{ "config": …, "inputs": … }` unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNode;

impl PassthroughNode {
    pub const TYPE_ID: &'static str = "passthrough";
}

#[async_trait]
impl ExecutableNode for PassthroughNode {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        Ok(input)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Value is `true`, a non-zero number or a non-empty string/array/object.
    #[default]
    Truthy,
    Is,
    IsNot,
    Contains,
    Empty,
    NotEmpty,
    Gt,
    Lt,
}

/// Gateway configuration, read from the node config.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// JSON pointer into the node input, e.g. `/inputs/check/score`.
    pub path: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Conditional (if/else) node.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayNode;

impl GatewayNode {
    pub const TYPE_ID: &'static str = "gateway";

    pub fn evaluate(config: &GatewayConfig, input: &Value) -> bool {
        let actual = input.pointer(&config.path);
        match config.operator {
            Operator::Truthy => actual.is_some_and(truthy),
            Operator::Empty => actual.map_or(true, |v| !truthy(v) && !v.is_number() && !v.is_boolean()),
            Operator::NotEmpty => actual.is_some_and(|v| v.is_number() || v.is_boolean() || truthy(v)),
            Operator::Is => actual.is_some() && actual == config.value.as_ref(),
            Operator::IsNot => actual != config.value.as_ref(),
            Operator::Contains => match (actual, config.value.as_ref()) {
                (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle.as_str()),
                (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
            Operator::Gt | Operator::Lt => {
                let (Some(a), Some(b)) = (
                    actual.and_then(Value::as_f64),
                    config.value.as_ref().and_then(Value::as_f64),
                ) else {
                    return false;
                };
                if config.operator == Operator::Gt { a > b } else { a < b }
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[async_trait]
impl ExecutableNode for GatewayNode {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let raw = input.get("config").cloned().unwrap_or(Value::Null);
        let config: GatewayConfig = serde_json::from_value(raw)
            .map_err(|e| NodeError::Fatal(format!("invalid gateway config: {e}")))?;

        let taken = Self::evaluate(&config, &input);
        let branch = if taken { "true" } else { "false" };
        debug!(node_id = %ctx.node_id, branch, "gateway evaluated");

        Ok(json!({ "result": taken, "active_branches": branch }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            pipeline_id: uuid::Uuid::new_v4(),
            job_id: uuid::Uuid::new_v4(),
            node_id: "gate".into(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn gateway_takes_true_branch_when_threshold_exceeded() {
        let input = json!({
            "config": { "path": "/inputs/score/value", "operator": "gt", "value": 10 },
            "inputs": { "score": { "value": 42 } }
        });
        let out = GatewayNode.execute(input, &ctx()).await.unwrap();
        assert_eq!(out["active_branches"], "true");
    }

    #[tokio::test]
    async fn gateway_defaults_to_truthiness_and_takes_false_branch() {
        let input = json!({
            "config": { "path": "/inputs/flag" },
            "inputs": { "flag": "" }
        });
        let out = GatewayNode.execute(input, &ctx()).await.unwrap();
        assert_eq!(out["active_branches"], "false");
        assert_eq!(out["result"], false);
    }

    #[tokio::test]
    async fn gateway_without_path_is_fatal() {
        let input = json!({ "config": {}, "inputs": {} });
        let err = GatewayNode.execute(input, &ctx()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn contains_checks_strings_and_arrays() {
        let input = json!({ "tags": ["a", "b"], "text": "hello world" });
        let on_array = GatewayConfig {
            path: "/tags".into(),
            operator: Operator::Contains,
            value: Some(json!("b")),
        };
        let on_text = GatewayConfig {
            path: "/text".into(),
            operator: Operator::Contains,
            value: Some(json!("world")),
        };
        assert!(GatewayNode::evaluate(&on_array, &input));
        assert!(GatewayNode::evaluate(&on_text, &input));
    }

    #[tokio::test]
    async fn passthrough_echoes_input() {
        let input = json!({ "config": { "k": 1 }, "inputs": {} });
        let out = PassthroughNode.execute(input.clone(), &ctx()).await.unwrap();
        assert_eq!(out, input);
    }
}
