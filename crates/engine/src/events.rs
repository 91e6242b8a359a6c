//! Best-effort notifications for observers (logging, UI).
//!
//! Emitting never fails and never participates in the transactional path.

use std::sync::Mutex;

use tracing::info;

use db::{Job, Pipeline, PipelineId};

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    JobCreated { job: Job },
    JobsGenerated { pipeline: Pipeline, job_count: usize },
    JobCompleted { job: Job },
    JobRetried { job: Job, error: String },
    JobFailed { job: Job, error: String },
    PipelineCancelled { pipeline_id: PipelineId, cancelled_jobs: usize },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job.created",
            Self::JobsGenerated { .. } => "pipeline.jobs_generated",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobRetried { .. } => "job.retried",
            Self::JobFailed { .. } => "job.failed",
            Self::PipelineCancelled { .. } => "pipeline.cancelled",
        }
    }

    pub fn pipeline_id(&self) -> PipelineId {
        match self {
            Self::JobCreated { job }
            | Self::JobCompleted { job }
            | Self::JobRetried { job, .. }
            | Self::JobFailed { job, .. } => job.pipeline_id,
            Self::JobsGenerated { pipeline, .. } => pipeline.id,
            Self::PipelineCancelled { pipeline_id, .. } => *pipeline_id,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent) {
        let pipeline_id = event.pipeline_id();
        match &event {
            PipelineEvent::JobCreated { job }
            | PipelineEvent::JobCompleted { job } => {
                info!(event = event.name(), %pipeline_id, job_id = %job.id, node_id = %job.node_id, "pipeline event");
            }
            PipelineEvent::JobRetried { job, error } | PipelineEvent::JobFailed { job, error } => {
                info!(
                    event = event.name(),
                    %pipeline_id,
                    job_id = %job.id,
                    node_id = %job.node_id,
                    retry_count = job.retry_count,
                    error = %error,
                    "pipeline event"
                );
            }
            PipelineEvent::JobsGenerated { job_count, .. } => {
                info!(event = event.name(), %pipeline_id, job_count, "pipeline event");
            }
            PipelineEvent::PipelineCancelled { cancelled_jobs, .. } => {
                info!(event = event.name(), %pipeline_id, cancelled_jobs, "pipeline event");
            }
        }
    }
}

/// Keeps every event in memory; for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(PipelineEvent::name).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
