//! `nodes` crate: the `ExecutableNode` trait, a type registry, and built-in nodes.
//!
//! The engine hands every claimed job to the executor registered for its
//! node type through this trait object.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::NodeError;
pub use registry::NodeRegistry;
pub use traits::{ExecutableNode, ExecutionContext};
