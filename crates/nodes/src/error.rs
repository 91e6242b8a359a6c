//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method.
///
/// The variant decides retry behaviour:
/// - `Retryable`: the job goes back to `pending` while it has retries left.
/// - `Fatal`: the job is marked `failed` straight away.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("retryable node error: {0}")]
    Retryable(String),

    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl NodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}
