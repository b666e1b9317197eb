//! Data model for the job queue, ingestion tracking, and candidate matching.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use pgvector::Vector;

use crate::defaults;

// =============================================================================
// JOBS
// =============================================================================

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Extract, embed, and analyze one uploaded resume file
    ResumeProcessing,
    /// (Re)compute embeddings for a set of candidates
    BatchEmbedding,
    /// One-off data maintenance operation
    DataMigration,
}

impl JobType {
    /// Every job type, in declaration order.
    pub const ALL: [JobType; 3] = [
        JobType::ResumeProcessing,
        JobType::BatchEmbedding,
        JobType::DataMigration,
    ];

    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ResumeProcessing => "resume_processing",
            JobType::BatchEmbedding => "batch_embedding",
            JobType::DataMigration => "data_migration",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resume_processing" => Some(JobType::ResumeProcessing),
            "batch_embedding" => Some(JobType::BatchEmbedding),
            "data_migration" => Some(JobType::DataMigration),
            _ => None,
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Job priority. Ordering hint for claims only; never preemptive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl JobPriority {
    /// Numeric value stored in the database.
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    /// Convert a stored value, clamping out-of-range numbers.
    pub fn from_i16(value: i16) -> Self {
        match value {
            i16::MIN..=0 => JobPriority::Low,
            1 => JobPriority::Normal,
            2 => JobPriority::High,
            _ => JobPriority::Urgent,
        }
    }
}

/// A persisted unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub payload: Option<JsonValue>,
    pub metadata: Option<JsonValue>,
    /// Groups related jobs (e.g. every file of one upload batch).
    pub correlation_id: Option<Uuid>,
    /// Not-before time; `None` means immediately due.
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Worker currently holding the job.
    pub assigned_to: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    /// Whether the job may be claimed at `now` (ignoring status).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.map_or(true, |at| at <= now)
    }

    /// Whether an explicit retry may move this job back to PENDING.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    /// FAILED with no retries left: permanently terminal.
    pub fn is_dead_lettered(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count >= self.max_retries
    }

    /// Whether the job will never change state again.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Completed | JobStatus::Cancelled => true,
            JobStatus::Failed => self.is_dead_lettered(),
            JobStatus::Pending | JobStatus::Processing => false,
        }
    }

    /// Whether the heartbeat is older than `stale_before`.
    pub fn is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.heartbeat_at.map_or(true, |beat| beat < stale_before)
    }
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: Option<JsonValue>,
    pub metadata: Option<JsonValue>,
    pub priority: JobPriority,
    pub correlation_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub max_retries: i32,
}

impl NewJob {
    /// Create a request with normal priority and default retry budget.
    pub fn new(job_type: JobType, payload: JsonValue) -> Self {
        Self {
            job_type,
            payload: Some(payload),
            metadata: None,
            priority: JobPriority::Normal,
            correlation_id: None,
            scheduled_for: None,
            max_retries: defaults::JOB_MAX_RETRIES,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries.max(0);
        self
    }
}

/// Order claimed jobs the way the claim query selects them:
/// priority descending, then creation time ascending.
pub fn order_for_claim(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// What the stale sweep does with an orphaned PROCESSING job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimDecision {
    /// Back to PENDING for another attempt.
    Requeue,
    /// Terminal FAILED; retries are exhausted.
    DeadLetter,
}

/// Decide the fate of an orphaned job from its retry counters.
///
/// The decision uses the counters before the sweep increments `retry_count`;
/// both outcomes count the lost attempt.
pub fn decide_reclaim(retry_count: i32, max_retries: i32) -> ReclaimDecision {
    if retry_count < max_retries {
        ReclaimDecision::Requeue
    } else {
        ReclaimDecision::DeadLetter
    }
}

/// Result of one stale sweep.
#[derive(Debug, Clone, Default)]
pub struct ReclaimReport {
    /// Jobs returned to PENDING.
    pub requeued: Vec<Uuid>,
    /// Jobs moved to terminal FAILED, as they were after the sweep.
    pub dead_lettered: Vec<Job>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.dead_lettered.is_empty()
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: i64,
    pub offset: i64,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub dead_lettered: i64,
    pub total: i64,
}

// =============================================================================
// INGESTION
// =============================================================================

/// Progress of an upload batch through the resume ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionStatus {
    Initiated,
    EmbedGenerated,
    VectorDbUpdated,
    ResumeAnalyzed,
    Completed,
    Failed,
}

impl IngestionStatus {
    /// Forward stages in pipeline order.
    pub const STAGES: [IngestionStatus; 5] = [
        IngestionStatus::Initiated,
        IngestionStatus::EmbedGenerated,
        IngestionStatus::VectorDbUpdated,
        IngestionStatus::ResumeAnalyzed,
        IngestionStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Initiated => "initiated",
            IngestionStatus::EmbedGenerated => "embed_generated",
            IngestionStatus::VectorDbUpdated => "vector_db_updated",
            IngestionStatus::ResumeAnalyzed => "resume_analyzed",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(IngestionStatus::Initiated),
            "embed_generated" => Some(IngestionStatus::EmbedGenerated),
            "vector_db_updated" => Some(IngestionStatus::VectorDbUpdated),
            "resume_analyzed" => Some(IngestionStatus::ResumeAnalyzed),
            "completed" => Some(IngestionStatus::Completed),
            "failed" => Some(IngestionStatus::Failed),
            _ => None,
        }
    }

    /// Position in the forward pipeline; `None` for FAILED.
    pub fn rank(&self) -> Option<usize> {
        Self::STAGES.iter().position(|s| s == self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }

    /// Whether a tracker in this state may move to `next`.
    ///
    /// Stages only move forward; FAILED is reachable from any non-terminal
    /// state; terminal states never change.
    pub fn can_advance_to(&self, next: IngestionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target > current,
            (None, Some(_)) => false,
        }
    }
}

/// How one file of an upload batch resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Processed,
    Failed { reason: String },
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Processed => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

/// Aggregate progress record for one upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTracker {
    pub id: Uuid,
    pub uploaded_filename: String,
    pub total_files: i32,
    pub processed_files: i32,
    pub failed_files: i32,
    pub status: IngestionStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessTracker {
    /// Files that have reached a final outcome.
    pub fn resolved_files(&self) -> i32 {
        self.processed_files + self.failed_files
    }

    /// Whether every file of the batch has resolved.
    pub fn all_files_resolved(&self) -> bool {
        self.resolved_files() >= self.total_files
    }

    /// Move to a later pipeline stage. Returns false when the move is not allowed.
    pub fn advance(&mut self, next: IngestionStatus) -> bool {
        if next.is_terminal() || !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Count one file outcome; finalizes the tracker once all files resolved.
    ///
    /// Returns false (and changes nothing) when the tracker is terminal or the
    /// outcome would exceed `total_files`. Callers must count each job at most
    /// once; the repositories key outcomes by job id and apply these rules
    /// while holding the tracker row lock.
    pub fn apply_outcome(&mut self, outcome: &FileOutcome, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || self.all_files_resolved() {
            return false;
        }
        match outcome {
            FileOutcome::Processed => self.processed_files += 1,
            FileOutcome::Failed { reason } => {
                self.failed_files += 1;
                self.message = Some(reason.clone());
            }
        }
        if self.all_files_resolved() {
            self.status = final_batch_status(self.processed_files);
            self.message = Some(batch_summary(
                self.total_files,
                self.processed_files,
                self.failed_files,
            ));
            self.completed_at = Some(now);
        }
        true
    }
}

/// Terminal status of a fully resolved batch.
///
/// A batch with at least one processed file completes (degraded when some
/// files failed); a batch where every file failed is FAILED.
pub fn final_batch_status(processed_files: i32) -> IngestionStatus {
    if processed_files > 0 {
        IngestionStatus::Completed
    } else {
        IngestionStatus::Failed
    }
}

/// Operator-facing summary written to `tracker.message` on completion.
pub fn batch_summary(total: i32, processed: i32, failed: i32) -> String {
    if failed == 0 {
        format!("{processed} of {total} files processed")
    } else {
        format!("{processed} of {total} files processed, {failed} failed")
    }
}

// =============================================================================
// CANDIDATES AND REQUIREMENTS
// =============================================================================

/// A candidate built from an analyzed resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub current_title: Option<String>,
    pub years_of_experience: Option<f64>,
    pub skills: Vec<String>,
    pub education: Option<String>,
    pub summary: Option<String>,
    pub experience_summary: Option<String>,
    pub resume_text: String,
    pub content_hash: String,
    pub source_filename: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a resume is analyzed.
#[derive(Debug, Clone, Default)]
pub struct NewCandidate {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub current_title: Option<String>,
    pub years_of_experience: Option<f64>,
    pub skills: Vec<String>,
    pub education: Option<String>,
    pub summary: Option<String>,
    pub experience_summary: Option<String>,
    pub resume_text: String,
    pub content_hash: String,
    pub source_filename: Option<String>,
}

/// An open position candidates are matched against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequirement {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    pub min_years_experience: Option<f64>,
    pub education_level: Option<String>,
    pub domain: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Nearest-neighbour hit from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCandidate {
    pub candidate_id: Uuid,
    /// Cosine similarity (1 - cosine distance).
    pub score: f64,
}

// =============================================================================
// MATCHING
// =============================================================================

/// Score of one candidate against one requirement; unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub job_requirement_id: Uuid,
    pub match_score: f64,
    pub skills_score: Option<f64>,
    pub experience_score: Option<f64>,
    pub education_score: Option<f64>,
    pub domain_score: Option<f64>,
    pub explanation: Option<String>,
    pub strengths: Option<String>,
    pub gaps: Option<String>,
    pub is_shortlisted: bool,
    pub is_selected: bool,
    pub recruiter_notes: Option<String>,
    /// 1 for a first-pass score, 2 when replaced by an enriched re-match.
    pub match_pass: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of one scoring pass, written with [`crate::MatchRepository::upsert_score`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub candidate_id: Uuid,
    pub job_requirement_id: Uuid,
    pub match_score: f64,
    pub skills_score: Option<f64>,
    pub experience_score: Option<f64>,
    pub education_score: Option<f64>,
    pub domain_score: Option<f64>,
    pub explanation: Option<String>,
    pub strengths: Option<String>,
    pub gaps: Option<String>,
    pub match_pass: i16,
}

impl MatchScore {
    /// Auto-shortlist rule applied on every upsert.
    pub fn is_shortlisted(&self) -> bool {
        self.match_score >= defaults::AUTO_SHORTLIST_THRESHOLD
    }
}

/// Recruiter edits to a match.
#[derive(Debug, Clone, Default)]
pub struct MatchReview {
    pub is_shortlisted: Option<bool>,
    pub is_selected: Option<bool>,
    pub recruiter_notes: Option<String>,
}

/// Lifecycle of a matching run's audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    InProgress,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(AuditStatus::InProgress),
            "completed" => Some(AuditStatus::Completed),
            "failed" => Some(AuditStatus::Failed),
            _ => None,
        }
    }
}

/// One row per matching-engine invocation against a requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAudit {
    pub id: Uuid,
    pub job_requirement_id: Uuid,
    pub total_candidates: i32,
    pub successful_matches: i32,
    pub shortlisted_count: i32,
    pub rematched_count: i32,
    pub average_match_score: Option<f64>,
    pub highest_match_score: Option<f64>,
    pub duration_ms: Option<i64>,
    pub estimated_tokens_used: i64,
    pub status: AuditStatus,
    pub initiated_by: Option<String>,
    pub error_message: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Totals written when a run finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditOutcome {
    pub total_candidates: i32,
    pub successful_matches: i32,
    pub shortlisted_count: i32,
    pub rematched_count: i32,
    pub average_match_score: Option<f64>,
    pub highest_match_score: Option<f64>,
    pub duration_ms: i64,
    pub estimated_tokens_used: i64,
}

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Outcome of the last fetch of an external profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileStatus {
    Pending,
    Success,
    Failed,
    NotFound,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::Pending => "pending",
            ProfileStatus::Success => "success",
            ProfileStatus::Failed => "failed",
            ProfileStatus::NotFound => "not_found",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProfileStatus::Pending),
            "success" => Some(ProfileStatus::Success),
            "failed" => Some(ProfileStatus::Failed),
            "not_found" => Some(ProfileStatus::NotFound),
            _ => None,
        }
    }

    /// FAILED and NOT_FOUND rows are candidates for a manual retry.
    pub fn is_failure(&self) -> bool {
        matches!(self, ProfileStatus::Failed | ProfileStatus::NotFound)
    }
}

/// Cached external profile; unique per (candidate, source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateExternalProfile {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub source: String,
    pub status: ProfileStatus,
    pub profile_url: Option<String>,
    pub raw_data: Option<JsonValue>,
    pub enriched_summary: Option<String>,
    pub error_message: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateExternalProfile {
    /// Whether the cached row may be reused at `now` under a TTL in days.
    /// A TTL too large to represent never expires.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_days: i64) -> bool {
        match self.last_fetched_at {
            Some(fetched) if self.status != ProfileStatus::Pending => {
                Duration::try_days(ttl_days).map_or(true, |ttl| now - fetched < ttl)
            }
            _ => false,
        }
    }
}

/// Values written after a fetch attempt.
#[derive(Debug, Clone)]
pub struct ProfileUpsert {
    pub candidate_id: Uuid,
    pub source: String,
    pub status: ProfileStatus,
    pub profile_url: Option<String>,
    pub raw_data: Option<JsonValue>,
    pub enriched_summary: Option<String>,
    pub error_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(priority: JobPriority, created_secs: i64) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::ResumeProcessing,
            status: JobStatus::Pending,
            priority,
            payload: None,
            metadata: None,
            correlation_id: None,
            scheduled_for: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + created_secs, 0).unwrap(),
            started_at: None,
            completed_at: None,
            heartbeat_at: None,
            retry_count: 0,
            max_retries: 3,
            assigned_to: None,
            error_message: None,
        }
    }

    fn tracker(total: i32) -> ProcessTracker {
        ProcessTracker {
            id: Uuid::new_v4(),
            uploaded_filename: "batch.zip".to_string(),
            total_files: total,
            processed_files: 0,
            failed_files: 0,
            status: IngestionStatus::Initiated,
            message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_job_type_round_trip() {
        for job_type in JobType::ALL {
            assert_eq!(JobType::parse(job_type.as_str()), Some(job_type));
        }
        assert_eq!(JobType::parse("RESUME_PROCESSING"), None);
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_priority_values() {
        assert_eq!(JobPriority::Low.as_i16(), 0);
        assert_eq!(JobPriority::Normal.as_i16(), 1);
        assert_eq!(JobPriority::High.as_i16(), 2);
        assert_eq!(JobPriority::Urgent.as_i16(), 3);
        assert_eq!(JobPriority::from_i16(-4), JobPriority::Low);
        assert_eq!(JobPriority::from_i16(9), JobPriority::Urgent);
        assert!(JobPriority::Urgent > JobPriority::Low);
    }

    #[test]
    fn test_job_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&JobType::BatchEmbedding).unwrap();
        assert_eq!(json, "\"BATCH_EMBEDDING\"");
    }

    #[test]
    fn test_order_for_claim_priority_then_age() {
        let low = job(JobPriority::Low, 0);
        let urgent = job(JobPriority::Urgent, 1);
        let normal = job(JobPriority::Normal, 2);
        let mut jobs = vec![low.clone(), urgent.clone(), normal.clone()];
        order_for_claim(&mut jobs);
        let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![urgent.id, normal.id, low.id]);
    }

    #[test]
    fn test_order_for_claim_fifo_within_priority() {
        let first = job(JobPriority::High, 0);
        let second = job(JobPriority::High, 5);
        let mut jobs = vec![second.clone(), first.clone()];
        order_for_claim(&mut jobs);
        assert_eq!(jobs[0].id, first.id);
    }

    #[test]
    fn test_decide_reclaim_boundaries() {
        assert_eq!(decide_reclaim(0, 3), ReclaimDecision::Requeue);
        assert_eq!(decide_reclaim(2, 3), ReclaimDecision::Requeue);
        assert_eq!(decide_reclaim(3, 3), ReclaimDecision::DeadLetter);
        assert_eq!(decide_reclaim(4, 3), ReclaimDecision::DeadLetter);
        assert_eq!(decide_reclaim(0, 0), ReclaimDecision::DeadLetter);
    }

    #[test]
    fn test_job_retry_and_dead_letter_flags() {
        let mut j = job(JobPriority::Normal, 0);
        j.status = JobStatus::Failed;
        j.retry_count = 2;
        assert!(j.can_retry());
        assert!(!j.is_dead_lettered());
        assert!(!j.is_terminal());

        j.retry_count = 3;
        assert!(!j.can_retry());
        assert!(j.is_dead_lettered());
        assert!(j.is_terminal());
    }

    #[test]
    fn test_job_is_due() {
        let now = Utc::now();
        let mut j = job(JobPriority::Normal, 0);
        assert!(j.is_due(now));
        j.scheduled_for = Some(now + Duration::minutes(5));
        assert!(!j.is_due(now));
        j.scheduled_for = Some(now);
        assert!(j.is_due(now));
    }

    #[test]
    fn test_job_is_stale() {
        let now = Utc::now();
        let mut j = job(JobPriority::Normal, 0);
        j.status = JobStatus::Processing;
        j.heartbeat_at = Some(now - Duration::seconds(300));
        assert!(j.is_stale(now - Duration::seconds(120)));
        j.heartbeat_at = Some(now);
        assert!(!j.is_stale(now - Duration::seconds(120)));
        j.status = JobStatus::Pending;
        assert!(!j.is_stale(now));
    }

    #[test]
    fn test_new_job_builder() {
        let correlation = Uuid::new_v4();
        let new_job = NewJob::new(JobType::DataMigration, serde_json::json!({"operation": "x"}))
            .with_priority(JobPriority::High)
            .with_correlation_id(correlation)
            .with_max_retries(-2);
        assert_eq!(new_job.priority, JobPriority::High);
        assert_eq!(new_job.correlation_id, Some(correlation));
        assert_eq!(new_job.max_retries, 0);
    }

    #[test]
    fn test_ingestion_forward_only() {
        use IngestionStatus::*;
        assert!(Initiated.can_advance_to(EmbedGenerated));
        assert!(Initiated.can_advance_to(ResumeAnalyzed));
        assert!(!VectorDbUpdated.can_advance_to(EmbedGenerated));
        assert!(!ResumeAnalyzed.can_advance_to(ResumeAnalyzed));
        assert!(EmbedGenerated.can_advance_to(Failed));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Completed));
    }

    #[test]
    fn test_tracker_advance_rejects_terminal_targets() {
        let mut t = tracker(2);
        assert!(t.advance(IngestionStatus::EmbedGenerated));
        assert!(!t.advance(IngestionStatus::Initiated));
        assert!(!t.advance(IngestionStatus::Completed));
        assert_eq!(t.status, IngestionStatus::EmbedGenerated);
    }

    #[test]
    fn test_tracker_counts_monotonic_and_bounded() {
        let mut t = tracker(3);
        let now = Utc::now();
        let outcomes = [
            FileOutcome::Processed,
            FileOutcome::Failed {
                reason: "corrupt pdf".into(),
            },
            FileOutcome::Processed,
            FileOutcome::Processed,
        ];
        let mut last = 0;
        for outcome in &outcomes {
            t.apply_outcome(outcome, now);
            assert!(t.resolved_files() >= last);
            assert!(t.resolved_files() <= t.total_files);
            last = t.resolved_files();
        }
        assert_eq!(t.processed_files, 2);
        assert_eq!(t.failed_files, 1);
        assert_eq!(t.status, IngestionStatus::Completed);
        assert_eq!(
            t.message.as_deref(),
            Some("2 of 3 files processed, 1 failed")
        );
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn test_tracker_all_failed_is_failed() {
        let mut t = tracker(2);
        let now = Utc::now();
        let failed = FileOutcome::Failed {
            reason: "unsupported".into(),
        };
        assert!(t.apply_outcome(&failed, now));
        assert_eq!(t.status, IngestionStatus::Initiated);
        assert!(t.apply_outcome(&failed, now));
        assert_eq!(t.status, IngestionStatus::Failed);
        assert!(!t.apply_outcome(&FileOutcome::Processed, now));
        assert_eq!(t.processed_files, 0);
    }

    #[test]
    fn test_match_score_shortlist_threshold() {
        let mut score = MatchScore {
            candidate_id: Uuid::new_v4(),
            job_requirement_id: Uuid::new_v4(),
            match_score: 70.0,
            skills_score: None,
            experience_score: None,
            education_score: None,
            domain_score: None,
            explanation: None,
            strengths: None,
            gaps: None,
            match_pass: 1,
        };
        assert!(score.is_shortlisted());
        score.match_score = 69.9;
        assert!(!score.is_shortlisted());
    }

    #[test]
    fn test_profile_freshness() {
        let now = Utc::now();
        let mut profile = CandidateExternalProfile {
            id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            source: "web_search".to_string(),
            status: ProfileStatus::NotFound,
            profile_url: None,
            raw_data: None,
            enriched_summary: None,
            error_message: None,
            last_fetched_at: Some(now - Duration::days(2)),
            created_at: now,
            updated_at: now,
        };
        assert!(profile.is_fresh(now, 7));
        profile.last_fetched_at = Some(now - Duration::days(7));
        assert!(!profile.is_fresh(now, 7));
        assert!(profile.is_fresh(now, i64::MAX));
        profile.last_fetched_at = None;
        assert!(!profile.is_fresh(now, 7));
        profile.last_fetched_at = Some(now);
        profile.status = ProfileStatus::Pending;
        assert!(!profile.is_fresh(now, 7));
    }

    #[test]
    fn test_status_string_round_trips() {
        for status in [
            AuditStatus::InProgress,
            AuditStatus::Completed,
            AuditStatus::Failed,
        ] {
            assert_eq!(AuditStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            ProfileStatus::Pending,
            ProfileStatus::Success,
            ProfileStatus::Failed,
            ProfileStatus::NotFound,
        ] {
            assert_eq!(ProfileStatus::parse(status.as_str()), Some(status));
        }
        for status in IngestionStatus::STAGES {
            assert_eq!(IngestionStatus::parse(status.as_str()), Some(status));
        }
    }
}
