//! End-to-end tests for job generation, readiness and the run loop.
//!
//! Everything runs against `MemoryStore`, `MemoryEventSink` and `MockNode`,
//! so no Postgres connection is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use db::{
    DbError, Job, JobId, JobRepository, JobStatus, MemoryStore, NewJob, PipelineId,
    PipelineRepository, PipelineStatus,
};
use nodes::mock::MockNode;
use nodes::{ExecutableNode, NodeRegistry};

use crate::{
    plan, EngineError, FailureOutcome, JobGenerator, MemoryEventSink, NodeId, Orchestrator,
    OrchestratorConfig, ReadinessEvaluator, Workflow, WorkflowEdge, WorkflowNode,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    events: Arc<MemoryEventSink>,
    generator: JobGenerator,
}

fn harness(workflow: &Workflow) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.insert_workflow(
        workflow.id.clone(),
        serde_json::to_value(workflow).expect("workflow serialises"),
    );
    let events = Arc::new(MemoryEventSink::new());
    let generator = JobGenerator::new(store.clone(), store.clone(), store.clone(), events.clone());
    Harness { store, events, generator }
}

impl Harness {
    fn readiness(&self) -> ReadinessEvaluator {
        ReadinessEvaluator::new(self.store.clone())
    }

    fn orchestrator(&self, registry: NodeRegistry) -> Orchestrator {
        let config = OrchestratorConfig {
            retry_base_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            ..OrchestratorConfig::default()
        };
        Orchestrator::new(self.store.clone(), self.store.clone(), registry, self.events.clone(), config)
    }

    async fn generate(&self, workflow_id: &str) -> (PipelineId, Vec<Job>) {
        let (pipeline, jobs) = self
            .generator
            .create_pipeline(workflow_id)
            .await
            .expect("generation succeeds");
        (pipeline.id, jobs)
    }

    async fn ready_nodes(&self, pipeline_id: PipelineId) -> Vec<String> {
        self.readiness()
            .get_ready_jobs(pipeline_id)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.node_id.to_string())
            .collect()
    }

    /// Force a job to `completed` with the given output.
    async fn complete(&self, jobs: &[Job], node: &str, output: Value) {
        let mut job = self.store.get_job(job_for(jobs, node).id).await.unwrap();
        job.status = JobStatus::Completed;
        job.output_data = Some(output);
        self.store.save_job(&job).await.unwrap();
    }
}

fn job_for<'a>(jobs: &'a [Job], node: &str) -> &'a Job {
    jobs.iter()
        .find(|job| job.node_id.as_str() == node)
        .unwrap_or_else(|| panic!("no job for node {node}"))
}

fn node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, "mock")
}

fn ids(nodes: &[NodeId]) -> Vec<&str> {
    nodes.iter().map(NodeId::as_str).collect()
}

fn registry(entries: Vec<(&str, Arc<MockNode>)>) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for (type_id, node) in entries {
        let node: Arc<dyn ExecutableNode> = node;
        registry.register(type_id, node);
    }
    registry
}

/// Job store that cancels the owning pipeline right before a completion or
/// failure is written, the way a concurrent `cancel_pipeline` would.
struct CancelBeforeReport {
    inner: Arc<MemoryStore>,
}

impl CancelBeforeReport {
    async fn cancel_owner(&self, id: JobId) -> Result<(), DbError> {
        let job = self.inner.get_job(id).await?;
        self.inner.cancel_jobs(job.pipeline_id).await?;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for CancelBeforeReport {
    async fn create_job(&self, job: NewJob) -> Result<Job, DbError> {
        self.inner.create_job(job).await
    }

    async fn save_job(&self, job: &Job) -> Result<(), DbError> {
        self.inner.save_job(job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Job, DbError> {
        self.inner.get_job(id).await
    }

    async fn load_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        self.inner.load_jobs(pipeline_id).await
    }

    async fn load_jobs_by_status(
        &self,
        pipeline_id: PipelineId,
        status: JobStatus,
    ) -> Result<Vec<Job>, DbError> {
        self.inner.load_jobs_by_status(pipeline_id, status).await
    }

    async fn claim_job(&self, id: JobId) -> Result<bool, DbError> {
        self.inner.claim_job(id).await
    }

    async fn complete_job(&self, id: JobId, output: Value) -> Result<Option<Job>, DbError> {
        self.cancel_owner(id).await?;
        self.inner.complete_job(id, output).await
    }

    async fn fail_job(&self, id: JobId, message: &str, retry: bool) -> Result<Option<Job>, DbError> {
        self.cancel_owner(id).await?;
        self.inner.fail_job(id, message, retry).await
    }

    async fn cancel_jobs(&self, pipeline_id: PipelineId) -> Result<Vec<Job>, DbError> {
        self.inner.cancel_jobs(pipeline_id).await
    }

    async fn delete_jobs(&self, pipeline_id: PipelineId) -> Result<u64, DbError> {
        self.inner.delete_jobs(pipeline_id).await
    }
}

/// A → B → C over data edges.
fn linear() -> Workflow {
    Workflow::new(
        "linear",
        vec![node("A"), node("B"), node("C")],
        vec![WorkflowEdge::data("A", "B"), WorkflowEdge::data("B", "C")],
    )
}

/// Gateway G with trigger edges on its `true` branch to X and `false` to Y.
fn gateway() -> Workflow {
    Workflow::new(
        "gateway",
        vec![WorkflowNode::new("G", "gate"), node("X"), node("Y")],
        vec![
            WorkflowEdge::trigger("G", "X", Some("true")),
            WorkflowEdge::trigger("G", "Y", Some("false")),
        ],
    )
}

// ============================================================
// Generation
// ============================================================

#[tokio::test]
async fn linear_chain_gets_ranked_priorities_and_wiring() {
    let h = harness(&linear());
    let (pipeline_id, jobs) = h.generate("linear").await;

    assert_eq!(jobs.len(), 3);
    let (a, b, c) = (job_for(&jobs, "A"), job_for(&jobs, "B"), job_for(&jobs, "C"));
    assert_eq!((a.priority, b.priority, c.priority), (0, 15, 25));
    assert!(a.dependent_jobs.is_empty());
    assert_eq!(b.dependent_jobs, vec![a.id]);
    assert_eq!(c.dependent_jobs, vec![b.id]);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Pending));

    let pipeline = h.store.get_pipeline(pipeline_id).await.unwrap();
    assert_eq!(pipeline.job_ids, vec![a.id, b.id, c.id]);

    // Wiring is persisted, not only returned.
    let stored = h.store.get_job(c.id).await.unwrap();
    assert_eq!(stored.dependent_jobs, vec![b.id]);
    assert_eq!(stored.metadata.incoming_edges.len(), 1);
}

#[tokio::test]
async fn generation_emits_one_event_per_job_then_summary() {
    let h = harness(&linear());
    h.generate("linear").await;

    assert_eq!(
        h.events.names(),
        vec!["job.created", "job.created", "job.created", "pipeline.jobs_generated"]
    );
}

#[tokio::test]
async fn every_node_gets_exactly_one_job() {
    let wf = Workflow::new(
        "diamond",
        vec![node("a"), node("b"), node("c"), node("d"), node("lonely")],
        vec![
            WorkflowEdge::data("a", "b"),
            WorkflowEdge::data("a", "c"),
            WorkflowEdge::data("b", "d"),
            WorkflowEdge::data("c", "d"),
        ],
    );
    let h = harness(&wf);
    let (_, jobs) = h.generate("diamond").await;

    let mut nodes: Vec<&str> = jobs.iter().map(|job| job.node_id.as_str()).collect();
    nodes.sort_unstable();
    assert_eq!(nodes, vec!["a", "b", "c", "d", "lonely"]);

    // Every dependency has a strictly lower priority than its dependent.
    for job in &jobs {
        for dep in &job.dependent_jobs {
            let upstream = jobs.iter().find(|j| j.id == *dep).unwrap();
            assert!(upstream.priority < job.priority);
        }
    }
}

#[tokio::test]
async fn cycle_is_rejected_before_any_job_exists() {
    let wf = Workflow::new(
        "loop",
        vec![node("a"), node("b"), node("c")],
        vec![
            WorkflowEdge::data("a", "b"),
            WorkflowEdge::data("b", "c"),
            WorkflowEdge::data("c", "b"),
        ],
    );
    let h = harness(&wf);
    let pipeline = h.store.create_pipeline("loop").await.unwrap();

    let err = h.generator.generate(pipeline.id).await.unwrap_err();
    assert!(matches!(err, EngineError::CircularDependency { .. }), "{err}");
    assert!(err.is_authoring_error());
    assert_eq!(h.store.job_count(), 0);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn empty_workflow_is_rejected() {
    let h = harness(&Workflow::new("empty", vec![], vec![]));
    let pipeline = h.store.create_pipeline("empty").await.unwrap();

    let err = h.generator.generate(pipeline.id).await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyWorkflow(ref id) if id == "empty"));
    assert_eq!(h.store.job_count(), 0);
}

#[tokio::test]
async fn unknown_workflow_is_reported() {
    let h = harness(&linear());
    let pipeline = h.store.create_pipeline("nope").await.unwrap();

    let err = h.generator.generate(pipeline.id).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingWorkflow(ref id) if id == "nope"));
}

#[test]
fn dangling_edge_and_duplicate_ids_fail_planning() {
    let dangling = Workflow::new("w", vec![node("a")], vec![WorkflowEdge::data("a", "ghost")]);
    assert!(matches!(
        plan(&dangling),
        Err(EngineError::UnknownNodeReference { side: "target", .. })
    ));

    let dup = Workflow::new("w", vec![node("a"), node("a")], vec![]);
    assert!(matches!(plan(&dup), Err(EngineError::DuplicateNodeId(_))));
}

#[tokio::test]
async fn storage_failure_mid_generation_is_not_an_authoring_error() {
    let h = harness(&linear());
    let pipeline = h.store.create_pipeline("linear").await.unwrap();
    h.store.fail_job_creation_after(2);

    let err = h.generator.generate(pipeline.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Materialization(_)), "{err}");
    assert!(!err.is_authoring_error());
    // Jobs created before the failure stay behind.
    assert_eq!(h.store.job_count(), 2);
    let pipeline = h.store.get_pipeline(pipeline.id).await.unwrap();
    assert!(pipeline.job_ids.is_empty());
}

#[tokio::test]
async fn generating_twice_is_rejected() {
    let h = harness(&linear());
    let (pipeline_id, _) = h.generate("linear").await;

    let err = h.generator.generate(pipeline_id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyGenerated(id) if id == pipeline_id), "{err}");
    assert!(!err.is_authoring_error());
    assert_eq!(h.store.job_count(), 3);
    let pipeline = h.store.get_pipeline(pipeline_id).await.unwrap();
    assert_eq!(pipeline.job_ids.len(), 3);
}

#[tokio::test]
async fn leftovers_of_a_failed_generation_block_generate_but_not_regenerate() {
    let h = harness(&linear());
    let pipeline = h.store.create_pipeline("linear").await.unwrap();
    h.store.fail_job_creation_after(1);
    assert!(h.generator.generate(pipeline.id).await.is_err());

    h.store.fail_job_creation_after(usize::MAX);
    assert!(matches!(
        h.generator.generate(pipeline.id).await,
        Err(EngineError::AlreadyGenerated(_))
    ));

    let jobs = h.generator.regenerate(pipeline.id).await.unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(h.store.job_count(), 3);
}

#[tokio::test]
async fn regenerate_replaces_existing_jobs() {
    let h = harness(&linear());
    let (pipeline_id, first) = h.generate("linear").await;

    let second = h.generator.regenerate(pipeline_id).await.unwrap();
    assert_eq!(second.len(), 3);
    assert_eq!(h.store.job_count(), 3);
    assert!(second.iter().all(|job| first.iter().all(|old| old.id != job.id)));

    let pipeline = h.store.get_pipeline(pipeline_id).await.unwrap();
    assert_eq!(pipeline.job_ids, second.iter().map(|j| j.id).collect::<Vec<_>>());
}

// ============================================================
// Readiness
// ============================================================

#[tokio::test]
async fn downstream_waits_for_its_data_sources() {
    let h = harness(&linear());
    let (pipeline_id, jobs) = h.generate("linear").await;

    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["A"]);

    h.complete(&jobs, "A", json!({})).await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["B"]);

    h.complete(&jobs, "B", json!({})).await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["C"]);
}

#[tokio::test]
async fn readiness_is_idempotent() {
    let h = harness(&linear());
    let (pipeline_id, jobs) = h.generate("linear").await;
    h.complete(&jobs, "A", json!({})).await;

    let first = h.ready_nodes(pipeline_id).await;
    let second = h.ready_nodes(pipeline_id).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn ready_jobs_come_back_in_priority_order() {
    // `solo` has rank 0; `late` depends on `early`.
    let wf = Workflow::new(
        "mixed",
        vec![node("late"), node("early"), node("solo")],
        vec![WorkflowEdge::data("early", "late")],
    );
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("mixed").await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["early", "solo"]);

    h.complete(&jobs, "early", json!({})).await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["solo", "late"]);
}

#[tokio::test]
async fn gateway_activates_only_the_taken_branch() {
    let h = harness(&gateway());
    let (pipeline_id, jobs) = h.generate("gateway").await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["G"]);

    h.complete(&jobs, "G", json!({ "active_branches": " TRUE " })).await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["X"]);
}

#[tokio::test]
async fn any_trigger_overrides_data_gating() {
    let wf = Workflow::new(
        "override",
        vec![node("A"), node("T"), node("C")],
        vec![WorkflowEdge::data("A", "C"), WorkflowEdge::trigger("T", "C", None)],
    );
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("override").await;

    h.complete(&jobs, "T", json!({})).await;
    let ready = h.ready_nodes(pipeline_id).await;
    assert!(ready.contains(&"C".to_string()), "{ready:?}");
    assert!(ready.contains(&"A".to_string()));
}

#[tokio::test]
async fn one_satisfied_trigger_is_enough() {
    let wf = Workflow::new(
        "either",
        vec![node("P"), node("Q"), node("Z")],
        vec![WorkflowEdge::trigger("P", "Z", None), WorkflowEdge::trigger("Q", "Z", None)],
    );
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("either").await;

    h.complete(&jobs, "Q", json!({})).await;
    assert_eq!(h.ready_nodes(pipeline_id).await, vec!["P", "Z"]);
}

// ============================================================
// Orchestrator
// ============================================================

#[tokio::test]
async fn run_executes_chain_and_passes_upstream_output() {
    let wf = Workflow::new(
        "typed",
        vec![WorkflowNode::new("A", "source"), node("B"), node("C")],
        vec![WorkflowEdge::data("A", "B"), WorkflowEdge::data("B", "C")],
    );
    let h = harness(&wf);
    let (pipeline_id, _) = h.generate("typed").await;

    let a = Arc::new(MockNode::returning("a", json!({ "v": 1 })));
    let b = Arc::new(MockNode::returning("b", json!({})));
    let reg = registry(vec![("source", a.clone()), ("mock", b.clone())]);

    let summary = h.orchestrator(reg).run(pipeline_id).await.unwrap();

    assert_eq!(summary.status, PipelineStatus::Completed);
    assert_eq!(ids(&summary.completed), vec!["A", "B", "C"]);
    assert!(summary.not_reached.is_empty());
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 2);

    let b_input = &b.inputs()[0];
    assert_eq!(b_input["inputs"]["A"]["v"], 1);
    assert_eq!(b_input["config"], json!({}));

    let pipeline = h.store.get_pipeline(pipeline_id).await.unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Completed);
    assert_eq!(h.events.names().iter().filter(|n| **n == "job.completed").count(), 3);
}

#[tokio::test]
async fn run_skips_the_branch_the_gateway_did_not_take() {
    let h = harness(&gateway());
    let (pipeline_id, _) = h.generate("gateway").await;

    let gate = Arc::new(MockNode::branching("G", "true"));
    let worker = Arc::new(MockNode::returning("worker", json!({})));
    let reg = registry(vec![("gate", gate), ("mock", worker.clone())]);

    let summary = h.orchestrator(reg).run(pipeline_id).await.unwrap();

    assert_eq!(summary.status, PipelineStatus::Completed);
    assert_eq!(ids(&summary.completed), vec!["G", "X"]);
    assert_eq!(ids(&summary.not_reached), vec!["Y"]);
    assert_eq!(worker.call_count(), 1);
}

#[tokio::test]
async fn builtin_gateway_routes_on_config() {
    let wf = Workflow::new(
        "builtin",
        vec![
            WorkflowNode::new("G", "gateway")
                .with_config(json!({ "path": "/config/flag", "operator": "truthy", "flag": true })),
            WorkflowNode::new("yes", "passthrough"),
            WorkflowNode::new("no", "passthrough"),
        ],
        vec![
            WorkflowEdge::trigger("G", "yes", Some("true")),
            WorkflowEdge::trigger("G", "no", Some("false")),
        ],
    );
    let h = harness(&wf);
    let (pipeline_id, _) = h.generate("builtin").await;

    let summary = h.orchestrator(NodeRegistry::with_builtins()).run(pipeline_id).await.unwrap();
    assert_eq!(ids(&summary.completed), vec!["G", "yes"]);
    assert_eq!(ids(&summary.not_reached), vec!["no"]);
}

#[tokio::test]
async fn flaky_node_is_retried_until_it_succeeds() {
    let wf = Workflow::new("flaky", vec![node("only")], vec![]);
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("flaky").await;

    let flaky = Arc::new(MockNode::flaky("only", 2, json!({ "ok": true })));
    let summary = h
        .orchestrator(registry(vec![("mock", flaky.clone())]))
        .run(pipeline_id)
        .await
        .unwrap();

    assert_eq!(summary.status, PipelineStatus::Completed);
    assert_eq!(flaky.call_count(), 3);
    let job = h.store.get_job(jobs[0].id).await.unwrap();
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.output_data.as_ref().unwrap()["ok"], true);
    assert!(job.error_message.is_none());
    assert_eq!(h.events.names().iter().filter(|n| **n == "job.retried").count(), 2);
}

#[tokio::test]
async fn retries_stop_at_max_retries() {
    let wf = Workflow::new("hopeless", vec![node("only").with_max_retries(1)], vec![]);
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("hopeless").await;

    let failing = Arc::new(MockNode::failing_retryable("only", "upstream timeout"));
    let summary = h
        .orchestrator(registry(vec![("mock", failing.clone())]))
        .run(pipeline_id)
        .await
        .unwrap();

    assert_eq!(summary.status, PipelineStatus::Failed);
    assert_eq!(failing.call_count(), 2);
    let job = h.store.get_job(jobs[0].id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.error_message.as_deref(), Some("upstream timeout"));
}

#[tokio::test]
async fn fatal_failure_strands_downstream_jobs() {
    let h = harness(&linear());
    let (pipeline_id, _) = h.generate("linear").await;

    let fatal = Arc::new(MockNode::failing_fatal("boom", "bad config"));
    let summary = h
        .orchestrator(registry(vec![("mock", fatal.clone())]))
        .run(pipeline_id)
        .await
        .unwrap();

    assert_eq!(fatal.call_count(), 1);
    assert_eq!(summary.status, PipelineStatus::Failed);
    assert_eq!(ids(&summary.failed), vec!["A"]);
    assert_eq!(ids(&summary.not_reached), vec!["B", "C"]);
    assert!(h.events.names().contains(&"job.failed"));
}

#[tokio::test]
async fn unregistered_node_type_fails_without_retry() {
    let h = harness(&Workflow::new("orphan", vec![WorkflowNode::new("n", "unknown")], vec![]));
    let (pipeline_id, jobs) = h.generate("orphan").await;

    let summary = h.orchestrator(NodeRegistry::new()).run(pipeline_id).await.unwrap();

    assert_eq!(summary.status, PipelineStatus::Failed);
    let job = h.store.get_job(jobs[0].id).await.unwrap();
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.unwrap().contains("unknown"));
}

#[tokio::test]
async fn report_failure_respects_retry_budget() {
    let wf = Workflow::new("manual", vec![node("n").with_max_retries(1)], vec![]);
    let h = harness(&wf);
    let (_, jobs) = h.generate("manual").await;
    let orchestrator = h.orchestrator(NodeRegistry::new());
    let id = jobs[0].id;

    assert!(h.store.claim_job(id).await.unwrap());
    assert_eq!(
        orchestrator.report_failure(id, "blip", true).await.unwrap(),
        FailureOutcome::Retrying { attempt: 1 }
    );
    assert_eq!(h.store.get_job(id).await.unwrap().status, JobStatus::Pending);

    assert!(h.store.claim_job(id).await.unwrap());
    assert_eq!(orchestrator.report_failure(id, "blip", true).await.unwrap(), FailureOutcome::Failed);

    // Terminal jobs are not touched again.
    assert_eq!(orchestrator.report_failure(id, "late", false).await.unwrap(), FailureOutcome::Ignored);
    let done = orchestrator.report_completion(id, json!({})).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("blip"));
}

#[tokio::test]
async fn cancel_landing_before_a_report_is_not_overwritten() {
    let wf = Workflow::new("race", vec![node("a"), node("b")], vec![]);
    let h = harness(&wf);
    let (pipeline_id, jobs) = h.generate("race").await;
    let (a, b) = (job_for(&jobs, "a").id, job_for(&jobs, "b").id);
    assert!(h.store.claim_job(a).await.unwrap());
    assert!(h.store.claim_job(b).await.unwrap());

    let racing = Arc::new(CancelBeforeReport { inner: h.store.clone() });
    let orchestrator = Orchestrator::new(
        racing,
        h.store.clone(),
        NodeRegistry::new(),
        h.events.clone(),
        OrchestratorConfig::default(),
    );

    let after = orchestrator.report_completion(a, json!({ "v": 1 })).await.unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert!(after.output_data.is_none());

    assert_eq!(
        orchestrator.report_failure(b, "blip", true).await.unwrap(),
        FailureOutcome::Ignored
    );
    let b_job = h.store.get_job(b).await.unwrap();
    assert_eq!((b_job.status, b_job.retry_count), (JobStatus::Cancelled, 0));

    assert!(h.ready_nodes(pipeline_id).await.is_empty());
    let names = h.events.names();
    assert!(!names.contains(&"job.completed") && !names.contains(&"job.retried"), "{names:?}");
}

#[tokio::test]
async fn claiming_twice_loses_the_second_time() {
    let h = harness(&linear());
    let (_, jobs) = h.generate("linear").await;
    let a = job_for(&jobs, "A").id;

    assert!(h.store.claim_job(a).await.unwrap());
    assert!(!h.store.claim_job(a).await.unwrap());
}

#[tokio::test]
async fn cancel_marks_open_jobs_and_blocks_run() {
    let h = harness(&linear());
    let (pipeline_id, jobs) = h.generate("linear").await;
    let orchestrator = h.orchestrator(registry(vec![("mock", Arc::new(MockNode::returning("m", json!({}))))]));

    h.complete(&jobs, "A", json!({})).await;
    let cancelled = orchestrator.cancel_pipeline(pipeline_id).await.unwrap();
    assert_eq!(cancelled, 2);

    let counts = orchestrator.pipeline_counts(pipeline_id).await.unwrap();
    assert_eq!((counts.total, counts.completed, counts.cancelled), (3, 1, 2));
    assert_eq!(counts.status(), PipelineStatus::Cancelled);

    let summary = orchestrator.run(pipeline_id).await.unwrap();
    assert_eq!(summary.status, PipelineStatus::Cancelled);
    assert!(h.events.names().contains(&"pipeline.cancelled"));
}
