//! `db` crate: persistence layer for pipelines and jobs.
//!
//! Provides the typed job/pipeline records, the repository traits the
//! engine is written against, an in-memory store (tests, one-shot CLI runs)
//! and a Postgres store.  No scheduling logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;

pub use error::DbError;
pub use memory::MemoryStore;
pub use models::{
    EdgeRecord, Job, JobId, JobMetadata, JobStatus, NewJob, NodeId, Pipeline, PipelineId,
    PipelineStatus, DEFAULT_MAX_RETRIES,
};
pub use pool::DbPool;
pub use postgres::PgStore;
pub use repository::{JobRepository, PipelineRepository, WorkflowDefinitions};
