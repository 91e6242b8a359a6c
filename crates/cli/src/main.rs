//! `flowdrop` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow JSON file for structural errors and cycles.
//! - `plan`    : print the execution order with ranks and priorities.
//! - `run`     : generate and run a workflow in memory with the built-in nodes.
//! - `import`  : store a workflow definition in Postgres.
//! - `generate`: create a pipeline and its jobs in Postgres.
//! - `migrate` : run pending database migrations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::pool::{create_pool, run_migrations, PoolSettings};
use db::{MemoryStore, PgStore};
use engine::{
    plan, EngineError, JobGenerator, Orchestrator, OrchestratorConfig, TracingEventSink, Workflow,
};
use nodes::NodeRegistry;

#[derive(Parser)]
#[command(
    name = "flowdrop",
    about = "Workflow pipeline scheduler",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Database {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Print the execution plan of a workflow.
    Plan {
        path: PathBuf,
    },
    /// Generate and run a workflow in memory.
    Run {
        path: PathBuf,
        /// Base delay (ms) of the retry back-off.
        #[arg(long, default_value_t = 100)]
        retry_delay_ms: u64,
    },
    /// Store a workflow definition so pipelines can be generated from it.
    Import {
        path: PathBuf,
        #[command(flatten)]
        db: Database,
    },
    /// Create a pipeline for a stored workflow and generate its jobs.
    Generate {
        workflow_id: String,
        #[command(flatten)]
        db: Database,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: Database,
    },
}

/// Exit status when the workflow itself has to be fixed.
const EXIT_INVALID_WORKFLOW: u8 = 2;
/// Exit status for everything else (I/O, database, internal).
const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let status = exit_status(&err);
            if status == EXIT_INVALID_WORKFLOW {
                eprintln!("workflow is invalid: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(status)
        }
    }
}

/// Authoring errors anywhere in the chain map to [`EXIT_INVALID_WORKFLOW`].
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EngineError>() {
        Some(engine_err) if engine_err.is_authoring_error() => EXIT_INVALID_WORKFLOW,
        _ => EXIT_FAILURE,
    }
}

async fn execute(command: Command) -> Result<()> {
    match command {
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            let plan = plan(&workflow).context("validation failed")?;
            let order: Vec<&str> = plan.schedule.order().iter().map(|id| id.as_str()).collect();
            println!("workflow '{}' is valid; execution order: {order:?}", workflow.id);
        }
        Command::Plan { path } => {
            let workflow = read_workflow(&path)?;
            let plan = plan(&workflow).context("workflow is not schedulable")?;
            println!("{:<24} {:>4} {:>8} {:>5}", "node", "rank", "priority", "deps");
            for node in plan.schedule.order() {
                println!(
                    "{:<24} {:>4} {:>8} {:>5}",
                    node.as_str(),
                    plan.schedule.rank(node).unwrap_or_default(),
                    plan.schedule.priority(node).unwrap_or_default(),
                    plan.graph.dependencies(node).len(),
                );
            }
        }
        Command::Run { path, retry_delay_ms } => {
            let workflow = read_workflow(&path)?;
            let store = Arc::new(MemoryStore::new());
            let events = Arc::new(TracingEventSink);
            let generator = JobGenerator::new(
                Arc::new(workflow.clone()),
                store.clone(),
                store.clone(),
                events.clone(),
            );
            let (pipeline, jobs) = generator
                .create_pipeline(&workflow.id)
                .await
                .context("failed to generate pipeline")?;
            info!(pipeline_id = %pipeline.id, jobs = jobs.len(), "pipeline generated");

            let config = OrchestratorConfig {
                // Back-off is capped inside the orchestrator.
                retry_base_delay: std::time::Duration::from_millis(retry_delay_ms),
                ..OrchestratorConfig::default()
            };
            let orchestrator = Orchestrator::new(
                store.clone(),
                store,
                NodeRegistry::with_builtins(),
                events,
                config,
            );
            let summary = orchestrator.run(pipeline.id).await.context("pipeline run failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render summary")?
            );
        }
        Command::Import { path, db } => {
            let workflow = read_workflow(&path)?;
            plan(&workflow).context("refusing to import an invalid workflow")?;

            let store = connect(&db).await?;
            let definition = serde_json::to_value(&workflow).context("failed to encode workflow")?;
            store
                .save_workflow(&workflow.id, &workflow.label, &definition)
                .await
                .context("failed to store workflow")?;
            info!(workflow_id = %workflow.id, "workflow imported");
        }
        Command::Generate { workflow_id, db } => {
            let store = Arc::new(connect(&db).await?);
            let generator = JobGenerator::new(
                store.clone(),
                store.clone(),
                store.clone(),
                Arc::new(TracingEventSink),
            );
            let (pipeline, jobs) = generator
                .create_pipeline(&workflow_id)
                .await
                .with_context(|| format!("failed to generate pipeline for '{workflow_id}'"))?;
            println!("pipeline {} created with {} jobs", pipeline.id, jobs.len());
        }
        Command::Migrate { db } => {
            info!("Running migrations");
            let store = connect(&db).await?;
            run_migrations(store.pool()).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}

fn read_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    Workflow::from_json(&content).map_err(|e| {
        EngineError::InvalidWorkflow {
            workflow_id: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

async fn connect(db: &Database) -> Result<PgStore> {
    let settings = PoolSettings::new(db.database_url.clone()).max_connections(db.max_connections);
    let pool = create_pool(&settings).await.context("failed to connect to database")?;
    Ok(PgStore::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::DbError;
    use engine::{NodeId, WorkflowEdge, WorkflowNode};

    #[test]
    fn authoring_errors_exit_with_invalid_workflow_status() {
        let cyclic = Workflow::new(
            "loop",
            vec![WorkflowNode::new("a", "passthrough"), WorkflowNode::new("b", "passthrough")],
            vec![WorkflowEdge::data("a", "b"), WorkflowEdge::data("b", "a")],
        );
        let err = plan(&cyclic)
            .context("failed to generate pipeline")
            .unwrap_err();
        assert_eq!(exit_status(&err), EXIT_INVALID_WORKFLOW);

        let missing = anyhow::Error::new(EngineError::MissingWorkflow("wf".into()));
        assert_eq!(exit_status(&missing), EXIT_INVALID_WORKFLOW);

        let dup = anyhow::Error::new(EngineError::DuplicateNodeId(NodeId::new("a")))
            .context("refusing to import an invalid workflow");
        assert_eq!(exit_status(&dup), EXIT_INVALID_WORKFLOW);
    }

    #[test]
    fn unparsable_workflow_file_is_an_authoring_error() {
        let path = std::env::temp_dir().join(format!("flowdrop-broken-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_workflow(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(exit_status(&err), EXIT_INVALID_WORKFLOW);

        let missing = read_workflow(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(exit_status(&missing), EXIT_FAILURE);
    }

    #[test]
    fn infrastructure_errors_exit_with_failure_status() {
        let storage = anyhow::Error::new(EngineError::Materialization(DbError::NotFound))
            .context("failed to generate pipeline");
        assert_eq!(exit_status(&storage), EXIT_FAILURE);

        let io = anyhow::Error::new(std::io::Error::other("disk gone"));
        assert_eq!(exit_status(&io), EXIT_FAILURE);
    }
}
