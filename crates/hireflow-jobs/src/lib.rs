//! # hireflow-jobs
//!
//! Background job processing for hireflow.
//!
//! This crate provides:
//! - A bounded worker pool claiming jobs from the shared queue, with
//!   heartbeats for running jobs and events over a broadcast channel
//! - The stale-job reclaimer (requeue or dead-letter orphaned jobs, purge
//!   finished ones)
//! - Handlers for resume processing, batch embedding and data migration
//! - Resume text extraction and LLM resume analysis
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hireflow_db::Database;
//! use hireflow_jobs::{BatchEmbeddingHandler, WorkerBuilder, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let embeddings = Arc::new(hireflow_inference::OpenAIBackend::from_env()?);
//!
//! let worker = WorkerBuilder::from_database(&db)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(BatchEmbeddingHandler::from_database(&db, embeddings))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction;
pub mod handler;
pub mod handlers;
pub mod ingestion;
pub mod reclaimer;
pub mod resume;
pub mod worker;

// Re-export core types
pub use hireflow_core::*;

pub use adapters::{PdfTextExtractor, TextNativeExtractor};
pub use extraction::{ExtractionRegistry, ResumeFormat, TextExtractor};
pub use handler::{JobContext, JobHandler, JobResult};
pub use handlers::{
    BatchEmbeddingHandler, BatchEmbeddingPayload, DataMigrationHandler, DataMigrationPayload,
    MigrationOperation, ResumeJobPayload, ResumeProcessingHandler,
};
pub use ingestion::{submit_upload_batch, BatchSubmission, TrackerDeadLetterHook, UploadedFile};
pub use reclaimer::{
    DeadLetterHook, ReclaimerConfig, ReclaimerHandle, StaleJobReclaimer, SweepOutcome,
};
pub use resume::{normalize_skills, ParsedResume, ResumeAnalyzer};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default maximum retries for failed jobs.
pub const DEFAULT_MAX_RETRIES: i32 = hireflow_core::defaults::JOB_MAX_RETRIES;

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = hireflow_core::defaults::JOB_POLL_INTERVAL_MS;
