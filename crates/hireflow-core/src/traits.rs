//! Core traits for hireflow abstractions.
//!
//! These traits define the interfaces that the PostgreSQL repositories and the
//! inference backends implement, so the worker pool, the ingestion handlers
//! and the matching engine can be exercised against test doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Repository for job queue operations.
///
/// Every state change is a single conditional statement against the store;
/// the repository is the only coordination point between worker processes.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job. Returns the job id.
    async fn enqueue(&self, job: NewJob) -> Result<Uuid>;

    /// Claim up to `batch_size` due PENDING jobs of one type for `worker_id`.
    ///
    /// Claimed jobs are PROCESSING, assigned to the worker, heartbeated at
    /// claim time, and returned ordered by priority desc then created_at asc.
    async fn claim_next(
        &self,
        job_type: JobType,
        batch_size: i64,
        worker_id: &str,
    ) -> Result<Vec<Job>> {
        self.claim_next_for_types(&[job_type], batch_size, worker_id)
            .await
    }

    /// Claim up to `batch_size` due PENDING jobs whose type is in `job_types`.
    /// An empty slice claims nothing.
    async fn claim_next_for_types(
        &self,
        job_types: &[JobType],
        batch_size: i64,
        worker_id: &str,
    ) -> Result<Vec<Job>>;

    /// Extend liveness of a running job. Returns false when the job is no
    /// longer PROCESSING for this worker (reclaimed or finalized).
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool>;

    /// Mark a job COMPLETED. Returns false when the worker no longer holds it.
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: Option<JsonValue>,
    ) -> Result<bool>;

    /// Record a handler failure and return the job's resulting status.
    ///
    /// Retryable failures with retries left go back to PENDING; retryable
    /// failures without retries left and permanent failures end FAILED.
    /// Returns `None` when the worker no longer holds the job.
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobStatus>>;

    /// Explicitly move a FAILED job with retries left back to PENDING.
    async fn retry(&self, job_id: Uuid) -> Result<Job>;

    /// Cancel a job that has not been claimed yet.
    async fn cancel(&self, job_id: Uuid) -> Result<()>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// All jobs sharing a correlation id, oldest first.
    async fn list_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<Job>>;

    /// List jobs with filtering, newest first.
    async fn list_filtered(&self, filter: JobFilter) -> Result<Vec<Job>>;

    /// Get queue statistics.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Requeue or dead-letter PROCESSING jobs whose heartbeat is older than
    /// `stale_before`.
    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<ReclaimReport>;

    /// Delete COMPLETED and CANCELLED jobs finished before `older_than`.
    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// INGESTION TRAITS
// =============================================================================

/// Repository for upload batch trackers.
#[async_trait]
pub trait TrackerRepository: Send + Sync {
    /// Create a tracker in INITIATED for a batch of `total_files` files.
    async fn create(&self, uploaded_filename: &str, total_files: i32) -> Result<ProcessTracker>;

    /// Get tracker by ID.
    async fn get(&self, id: Uuid) -> Result<Option<ProcessTracker>>;

    /// Most recently created trackers.
    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessTracker>>;

    /// Move a non-terminal tracker forward to `stage`.
    /// Returns false when the tracker is already at or past it.
    async fn advance_stage(&self, id: Uuid, stage: IngestionStatus) -> Result<bool>;

    /// Non-terminal trackers, oldest first.
    async fn list_open(&self, limit: i64) -> Result<Vec<ProcessTracker>>;

    /// Count the outcome of the file handled by `job_id`, finalizing the
    /// tracker when every file resolved.
    ///
    /// Each job is counted at most once. Returns the updated tracker, or
    /// `None` when nothing changed (job already counted, or batch resolved).
    async fn record_file_outcome(
        &self,
        id: Uuid,
        job_id: Uuid,
        outcome: FileOutcome,
    ) -> Result<Option<ProcessTracker>>;

    /// Fail a non-terminal tracker outright.
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<bool>;
}

/// Repository for candidates built from resumes.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// Insert or update by email, falling back to content hash.
    async fn upsert(&self, candidate: NewCandidate) -> Result<Candidate>;

    /// Get candidate by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Candidate>>;

    /// All active candidates, oldest first.
    async fn list_active(&self) -> Result<Vec<Candidate>>;

    /// Active candidates with no stored embedding.
    async fn list_missing_embeddings(&self, limit: i64) -> Result<Vec<Uuid>>;

    /// Ids of every active candidate.
    async fn list_active_ids(&self) -> Result<Vec<Uuid>>;

    /// Replace a candidate's skill list.
    async fn update_skills(&self, id: Uuid, skills: &[String]) -> Result<()>;
}

/// Repository for job requirements.
#[async_trait]
pub trait JobRequirementRepository: Send + Sync {
    /// Get requirement by ID.
    async fn get(&self, id: Uuid) -> Result<Option<JobRequirement>>;
}

/// Similarity index over candidate embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store (or replace) a candidate's embedding.
    async fn upsert(&self, candidate_id: Uuid, vector: &Vector, model: &str) -> Result<()>;

    /// Nearest neighbours by cosine distance.
    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarCandidate>>;
}

// =============================================================================
// MATCHING TRAITS
// =============================================================================

/// Repository for candidate/requirement match scores.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Insert or replace a score, keeping recruiter selection and notes.
    async fn upsert_score(&self, score: &MatchScore) -> Result<CandidateMatch>;

    /// Get the match for one pair.
    async fn get(&self, candidate_id: Uuid, requirement_id: Uuid)
        -> Result<Option<CandidateMatch>>;

    /// All matches for a requirement, best first.
    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>>;

    /// Shortlisted matches for a requirement, best first.
    async fn list_shortlisted(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>>;

    /// Apply recruiter edits.
    async fn update_review(&self, match_id: Uuid, review: MatchReview) -> Result<CandidateMatch>;
}

/// Repository for matching-run audit rows.
#[async_trait]
pub trait MatchAuditRepository: Send + Sync {
    /// Open an IN_PROGRESS audit row.
    async fn start(&self, requirement_id: Uuid, initiated_by: Option<&str>)
        -> Result<MatchAudit>;

    /// Close an audit as COMPLETED with totals.
    async fn finish(&self, audit_id: Uuid, outcome: &AuditOutcome) -> Result<()>;

    /// Close an audit as FAILED.
    async fn fail(&self, audit_id: Uuid, outcome: &AuditOutcome, error: &str) -> Result<()>;

    /// Get audit by ID.
    async fn get(&self, audit_id: Uuid) -> Result<Option<MatchAudit>>;

    /// Audits for a requirement, newest first.
    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<MatchAudit>>;
}

// =============================================================================
// ENRICHMENT TRAITS
// =============================================================================

/// Cache of external profiles, unique per (candidate, source).
#[async_trait]
pub trait ExternalProfileRepository: Send + Sync {
    async fn get(&self, candidate_id: Uuid, source: &str)
        -> Result<Option<CandidateExternalProfile>>;

    /// Insert or overwrite the row for (candidate, source).
    async fn upsert(&self, profile: ProfileUpsert) -> Result<CandidateExternalProfile>;

    async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<CandidateExternalProfile>>;

    /// FAILED and NOT_FOUND rows, oldest fetch first.
    async fn list_failed(&self, limit: i64) -> Result<Vec<CandidateExternalProfile>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
