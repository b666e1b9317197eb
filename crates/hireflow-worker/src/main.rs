//! hireflow worker process.
//!
//! `hireflow-worker` (or `hireflow-worker run`) processes queued jobs until
//! ctrl-c. `hireflow-worker match <requirement-id> [initiated-by]` runs the
//! matching engine once against a job requirement and exits.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use hireflow_core::{defaults, EmbeddingBackend, GenerationBackend};
use hireflow_db::{Database, PoolConfig};
use hireflow_enrichment::{EnrichmentService, WebSearchSource};
use hireflow_inference::OpenAIBackend;
use hireflow_jobs::{
    BatchEmbeddingHandler, DataMigrationHandler, ReclaimerConfig, ResumeProcessingHandler,
    StaleJobReclaimer, TrackerDeadLetterHook, WorkerBuilder, WorkerConfig,
};
use hireflow_matching::{MatchingConfig, MatchingEngine};

#[derive(Parser)]
#[command(name = "hireflow-worker")]
#[command(author, version, about = "Resume ingestion workers and candidate matching")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/hireflow",
        global = true
    )]
    database_url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Process queued jobs until ctrl-c (default)
    Run,

    /// Score every active candidate against one job requirement
    Match {
        /// Job requirement to match against
        requirement_id: Uuid,

        /// Recorded on the match audit
        initiated_by: Option<String>,
    },
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
///
/// The returned guard must live as long as the process so buffered file
/// output is flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "hireflow_worker=info,hireflow_jobs=info,hireflow_matching=info,hireflow_enrichment=info,hireflow_db=warn"
            .into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("hireflow-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Enrichment sources available in this environment.
fn enrichment_service(db: &Database) -> anyhow::Result<EnrichmentService> {
    let mut service = EnrichmentService::new(Arc::new(db.external_profiles.clone()));
    match WebSearchSource::from_env()? {
        Some(source) => {
            info!(url = %source.config().api_url, "Web search enrichment enabled");
            service = service.with_source(Arc::new(source));
        }
        None => warn!("ENRICHMENT_SEARCH_API_KEY not set, re-matches use local summaries"),
    }
    Ok(service)
}

async fn run_workers(db: &Database, backend: Arc<OpenAIBackend>) -> anyhow::Result<()> {
    let embeddings: Arc<dyn EmbeddingBackend> = backend.clone();
    let llm: Arc<dyn GenerationBackend> = backend;

    let storage_root = std::env::var("RESUME_STORAGE_PATH")
        .unwrap_or_else(|_| defaults::RESUME_STORAGE_PATH.to_string());
    info!(storage_root = %storage_root, "Resume storage configured");

    let worker = WorkerBuilder::from_database(db)
        .with_config(WorkerConfig::from_env())
        .with_handler(
            ResumeProcessingHandler::from_database(db, embeddings.clone(), llm)
                .with_storage_root(&storage_root),
        )
        .with_handler(BatchEmbeddingHandler::from_database(db, embeddings))
        .with_handler(DataMigrationHandler::from_database(db))
        .build()
        .await;
    let worker_handle = worker.start();

    let reclaimer = StaleJobReclaimer::new(Arc::new(db.jobs.clone()), ReclaimerConfig::from_env())
        .with_hook(Arc::new(TrackerDeadLetterHook::new(
            Arc::new(db.jobs.clone()),
            Arc::new(db.trackers.clone()),
        )));
    let reclaimer_handle = reclaimer.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested");

    worker_handle.shutdown().await?;
    worker_handle.join().await?;
    reclaimer_handle.shutdown().await?;
    info!("Worker stopped");
    Ok(())
}

async fn run_match(
    db: &Database,
    backend: Arc<OpenAIBackend>,
    requirement_id: Uuid,
    initiated_by: Option<&str>,
) -> anyhow::Result<()> {
    let config = MatchingConfig::from_env()?;
    let engine = MatchingEngine::from_database(db, backend, config)
        .with_enrichment(enrichment_service(db)?);

    let summary = engine.run(requirement_id, initiated_by).await?;
    info!(
        audit_id = %summary.audit_id,
        total = summary.total_candidates,
        successful = summary.successful_matches,
        shortlisted = summary.shortlisted_count,
        rematched = summary.rematched_count,
        failed = summary.failed_candidates.len(),
        "Matching run finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    info!("Connecting to database...");
    let db = Database::connect_with_config(&cli.database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let backend = Arc::new(OpenAIBackend::from_env()?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_workers(&db, backend).await,
        Command::Match {
            requirement_id,
            initiated_by,
        } => run_match(&db, backend, requirement_id, initiated_by.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_runs_workers() {
        let cli = Cli::try_parse_from(["hireflow-worker"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["hireflow-worker", "run"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Run)));
    }

    #[test]
    fn test_match_parses_requirement_and_initiator() {
        let id = Uuid::new_v4();
        let cli =
            Cli::try_parse_from(["hireflow-worker", "match", &id.to_string(), "recruiter@acme"])
                .unwrap();
        match cli.command {
            Some(Command::Match {
                requirement_id,
                initiated_by,
            }) => {
                assert_eq!(requirement_id, id);
                assert_eq!(initiated_by.as_deref(), Some("recruiter@acme"));
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn test_match_rejects_malformed_requirement_id() {
        assert!(Cli::try_parse_from(["hireflow-worker", "match", "not-a-uuid"]).is_err());
        assert!(Cli::try_parse_from(["hireflow-worker", "match"]).is_err());
    }
}
