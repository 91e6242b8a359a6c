//! Job and pipeline records, plus the row structs they map onto.
//!
//! The domain-facing records (`Job`, `Pipeline`) are what the engine works
//! with.  The `*Row` structs map 1-to-1 onto database tables and carry no
//! behaviour beyond conversion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::DbError;

/// Default number of execution retries for a job whose node declares none.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a node within a single workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Repository-assigned job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Repository-assigned pipeline identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `completed`, `failed` and `cancelled` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Running   => "running",
            Self::Completed => "completed",
            Self::Failed    => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(DbError::Decode(format!("unknown job status: {other}"))),
        }
    }
}

/// Aggregate status of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Running   => "running",
            Self::Completed => "completed",
            Self::Failed    => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(DbError::Decode(format!("unknown pipeline status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge metadata
// ---------------------------------------------------------------------------

/// One endpoint's view of a workflow edge, stored in job metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: String,
    pub target_handle: String,
    pub is_trigger: bool,
    /// Branch taken from the source's output handle; empty when none.
    #[serde(default)]
    pub branch_name: String,
}

impl EdgeRecord {
    pub fn has_branch(&self) -> bool {
        !self.branch_name.is_empty()
    }
}

/// Metadata attached to every generated job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub pipeline_id: PipelineId,
    #[serde(default)]
    pub incoming_edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub outgoing_edges: Vec<EdgeRecord>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// A job as handed to the repository for creation; it has no id yet.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub pipeline_id: PipelineId,
    pub node_id: NodeId,
    pub node_type_id: String,
    pub label: String,
    pub priority: i64,
    pub input_data: Value,
    pub metadata: JobMetadata,
    pub max_retries: u32,
}

/// One unit of work: the execution of a single workflow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub node_id: NodeId,
    pub node_type_id: String,
    pub label: String,
    pub status: JobStatus,
    /// Lower runs earlier when several jobs are ready at once.
    pub priority: i64,
    /// Snapshot of the node config taken at generation time.
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub metadata: JobMetadata,
    /// Jobs this job depends on.
    pub dependent_jobs: Vec<JobId>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Materialise a `NewJob` under the given id, in `pending` status.
    pub fn from_new(id: JobId, new: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            pipeline_id: new.pipeline_id,
            node_id: new.node_id,
            node_type_id: new.node_type_id,
            label: new.label,
            status: JobStatus::Pending,
            priority: new.priority,
            input_data: new.input_data,
            output_data: None,
            metadata: new.metadata,
            dependent_jobs: Vec::new(),
            retry_count: 0,
            max_retries: new.max_retries,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// One execution request of a workflow; owns its jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub workflow_id: String,
    pub status: PipelineStatus,
    /// Jobs in materialisation order.
    pub job_ids: Vec<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(id: PipelineId, workflow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_id: workflow_id.into(),
            status: PipelineStatus::Pending,
            job_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub label: String,
    /// Full JSON workflow definition (nodes and edges).
    pub definition: Value,
    pub created_at: DateTime<Utc>,
}

/// A row of the `pipelines` table.
#[derive(Debug, Clone, FromRow)]
pub struct PipelineRow {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: String,
    pub job_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = DbError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PipelineId(row.id),
            workflow_id: row.workflow_id,
            status: row.status.parse()?,
            job_ids: row.job_ids.into_iter().map(JobId).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub node_id: String,
    pub node_type_id: String,
    pub label: String,
    pub status: String,
    pub priority: i64,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub metadata: Value,
    pub dependent_jobs: Vec<Uuid>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: JobId(row.id),
            pipeline_id: PipelineId(row.pipeline_id),
            node_id: NodeId(row.node_id),
            node_type_id: row.node_type_id,
            label: row.label,
            status: row.status.parse()?,
            priority: row.priority,
            input_data: row.input_data,
            output_data: row.output_data,
            metadata: serde_json::from_value(row.metadata)?,
            dependent_jobs: row.dependent_jobs.into_iter().map(JobId).collect(),
            retry_count: u32::try_from(row.retry_count).unwrap_or_default(),
            max_retries: u32::try_from(row.max_retries).unwrap_or_default(),
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
