//! In-memory repository doubles for unit and integration tests.
//!
//! Enabled by the `memory` feature. Each double keeps its rows behind one
//! mutex, so every operation is atomic in the same way the corresponding
//! PostgreSQL statement is, and follows the same transition rules. None of
//! this is used outside tests: cross-process coordination only exists in
//! the PostgreSQL repositories.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hireflow_core::{
    decide_reclaim, defaults, new_v7, order_for_claim, AuditOutcome, AuditStatus, Candidate,
    CandidateExternalProfile, CandidateMatch, CandidateRepository, Error, ExternalProfileRepository,
    FileOutcome, IngestionStatus, Job, JobFilter, JobRepository, JobRequirement,
    JobRequirementRepository, JobStatus, JobType, MatchAudit, MatchAuditRepository,
    MatchRepository, MatchReview, MatchScore, NewCandidate, NewJob, ProcessTracker,
    ProfileUpsert, QueueStats, ReclaimDecision, ReclaimReport, Result, SimilarCandidate,
    TrackerRepository, Vector, VectorIndex,
};

use crate::candidates::normalize_email;
use crate::matches::clamp_score;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// In-memory job queue.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a job's heartbeat, e.g. to simulate a crashed worker.
    pub fn set_heartbeat(&self, job_id: Uuid, at: DateTime<Utc>) {
        if let Some(job) = lock(&self.jobs).get_mut(&job_id) {
            job.heartbeat_at = Some(at);
        }
    }

    /// Snapshot of every job, oldest first.
    pub fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = lock(&self.jobs).values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    fn transition_error(job: Option<&Job>, job_id: Uuid, attempted: &str) -> Error {
        match job {
            Some(job) => Error::InvalidTransition(format!(
                "cannot {attempted} job {job_id} in status {} (retry {}/{})",
                job.status.as_str(),
                job.retry_count,
                job.max_retries
            )),
            None => Error::JobNotFound(job_id),
        }
    }

    fn held_by<'a>(
        jobs: &'a mut HashMap<Uuid, Job>,
        job_id: Uuid,
        worker_id: &str,
    ) -> Option<&'a mut Job> {
        jobs.get_mut(&job_id).filter(|j| {
            j.status == JobStatus::Processing && j.assigned_to.as_deref() == Some(worker_id)
        })
    }
}

fn release(job: &mut Job) {
    job.status = JobStatus::Pending;
    job.assigned_to = None;
    job.heartbeat_at = None;
    job.started_at = None;
    job.completed_at = None;
}

#[async_trait]
impl JobRepository for MemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<Uuid> {
        if job.max_retries < 0 {
            return Err(Error::InvalidInput(format!(
                "max_retries must be non-negative, got {}",
                job.max_retries
            )));
        }
        let id = new_v7();
        let row = Job {
            id,
            job_type: job.job_type,
            status: JobStatus::Pending,
            priority: job.priority,
            payload: job.payload,
            metadata: job.metadata,
            correlation_id: job.correlation_id,
            scheduled_for: job.scheduled_for,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            heartbeat_at: None,
            retry_count: 0,
            max_retries: job.max_retries,
            assigned_to: None,
            error_message: None,
        };
        lock(&self.jobs).insert(id, row);
        Ok(id)
    }

    async fn claim_next_for_types(
        &self,
        job_types: &[JobType],
        batch_size: i64,
        worker_id: &str,
    ) -> Result<Vec<Job>> {
        if job_types.is_empty() || batch_size <= 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let mut jobs = lock(&self.jobs);

        let mut due: Vec<Job> = jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && job_types.contains(&j.job_type)
                    && j.is_due(now)
            })
            .cloned()
            .collect();
        order_for_claim(&mut due);
        due.truncate(batch_size as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for candidate in due {
            if let Some(job) = jobs.get_mut(&candidate.id) {
                job.status = JobStatus::Processing;
                job.started_at = Some(now);
                job.heartbeat_at = Some(now);
                job.assigned_to = Some(worker_id.to_string());
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let mut jobs = lock(&self.jobs);
        Ok(match Self::held_by(&mut jobs, job_id, worker_id) {
            Some(job) => {
                job.heartbeat_at = Some(Utc::now());
                true
            }
            None => false,
        })
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: Option<JsonValue>,
    ) -> Result<bool> {
        let mut jobs = lock(&self.jobs);
        let Some(job) = Self::held_by(&mut jobs, job_id, worker_id) else {
            return Ok(false);
        };
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        if let Some(result) = result {
            let mut metadata = match job.metadata.take() {
                Some(JsonValue::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
            metadata.insert("result".to_string(), result);
            job.metadata = Some(JsonValue::Object(metadata));
        }
        Ok(true)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobStatus>> {
        let mut jobs = lock(&self.jobs);
        let Some(job) = Self::held_by(&mut jobs, job_id, worker_id) else {
            return Ok(None);
        };
        let requeue = retryable && job.retry_count < job.max_retries;
        if retryable {
            job.retry_count += 1;
        }
        job.error_message = Some(error.to_string());
        if requeue {
            release(job);
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        }
        Ok(Some(job.status))
    }

    async fn retry(&self, job_id: Uuid) -> Result<Job> {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&job_id) {
            Some(job) if job.can_retry() => {
                job.retry_count += 1;
                release(job);
                Ok(job.clone())
            }
            other => Err(Self::transition_error(other.as_deref(), job_id, "retry")),
        }
    }

    async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                Ok(())
            }
            other => Err(Self::transition_error(other.as_deref(), job_id, "cancel")),
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(lock(&self.jobs).get(&job_id).cloned())
    }

    async fn list_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<Job>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|j| j.correlation_id == Some(correlation_id))
            .collect())
    }

    async fn list_filtered(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let limit = if filter.limit > 0 { filter.limit } else { 50 } as usize;
        let mut jobs: Vec<Job> = self
            .all()
            .into_iter()
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| filter.job_type.map_or(true, |t| j.job_type == t))
            .collect();
        jobs.reverse();
        Ok(jobs
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(limit)
            .collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let hour_ago = Utc::now() - Duration::hours(1);
        let jobs = lock(&self.jobs);
        let finished_since = |status: JobStatus| {
            jobs.values()
                .filter(|j| j.status == status && j.completed_at.map_or(false, |t| t > hour_ago))
                .count() as i64
        };
        Ok(QueueStats {
            pending: jobs.values().filter(|j| j.status == JobStatus::Pending).count() as i64,
            processing: jobs
                .values()
                .filter(|j| j.status == JobStatus::Processing)
                .count() as i64,
            completed_last_hour: finished_since(JobStatus::Completed),
            failed_last_hour: finished_since(JobStatus::Failed),
            dead_lettered: jobs.values().filter(|j| j.is_dead_lettered()).count() as i64,
            total: jobs.len() as i64,
        })
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<ReclaimReport> {
        let now = Utc::now();
        let mut jobs = lock(&self.jobs);
        let mut report = ReclaimReport::default();

        let mut stale: Vec<&mut Job> = jobs
            .values_mut()
            .filter(|j| j.is_stale(stale_before))
            .collect();
        stale.sort_by_key(|j| j.created_at);

        for job in stale {
            let decision = decide_reclaim(job.retry_count, job.max_retries);
            job.retry_count += 1;
            match decision {
                ReclaimDecision::Requeue => {
                    release(job);
                    report.requeued.push(job.id);
                }
                ReclaimDecision::DeadLetter => {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(defaults::RETRIES_EXHAUSTED_MESSAGE.to_string());
                    job.completed_at = Some(now);
                    report.dead_lettered.push(job.clone());
                }
            }
        }
        Ok(report)
    }

    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, j| {
            let finished = matches!(j.status, JobStatus::Completed | JobStatus::Cancelled);
            !(finished && j.completed_at.map_or(false, |t| t < older_than))
        });
        Ok((before - jobs.len()) as u64)
    }
}

// =============================================================================
// TRACKERS
// =============================================================================

/// In-memory upload batch trackers.
#[derive(Default)]
pub struct MemoryTrackers {
    trackers: Mutex<HashMap<Uuid, TrackerEntry>>,
}

struct TrackerEntry {
    tracker: ProcessTracker,
    /// Jobs whose file outcome has been counted.
    counted_jobs: HashSet<Uuid>,
}

impl MemoryTrackers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerRepository for MemoryTrackers {
    async fn create(&self, uploaded_filename: &str, total_files: i32) -> Result<ProcessTracker> {
        if total_files <= 0 {
            return Err(Error::InvalidInput(format!(
                "upload batch must contain at least one file, got {total_files}"
            )));
        }
        let tracker = ProcessTracker {
            id: new_v7(),
            uploaded_filename: uploaded_filename.to_string(),
            total_files,
            processed_files: 0,
            failed_files: 0,
            status: IngestionStatus::Initiated,
            message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        lock(&self.trackers).insert(
            tracker.id,
            TrackerEntry {
                tracker: tracker.clone(),
                counted_jobs: HashSet::new(),
            },
        );
        Ok(tracker)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProcessTracker>> {
        Ok(lock(&self.trackers).get(&id).map(|e| e.tracker.clone()))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessTracker>> {
        let mut trackers: Vec<ProcessTracker> =
            lock(&self.trackers).values().map(|e| e.tracker.clone()).collect();
        trackers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trackers.truncate(limit.max(1) as usize);
        Ok(trackers)
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<ProcessTracker>> {
        let mut trackers: Vec<ProcessTracker> = lock(&self.trackers)
            .values()
            .filter(|e| !e.tracker.status.is_terminal())
            .map(|e| e.tracker.clone())
            .collect();
        trackers.sort_by_key(|t| t.created_at);
        trackers.truncate(limit.max(1) as usize);
        Ok(trackers)
    }

    async fn advance_stage(&self, id: Uuid, stage: IngestionStatus) -> Result<bool> {
        if stage.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "tracker {id} reaches {} only through file outcomes",
                stage.as_str()
            )));
        }
        let mut trackers = lock(&self.trackers);
        let entry = trackers.get_mut(&id).ok_or(Error::TrackerNotFound(id))?;
        Ok(entry.tracker.advance(stage))
    }

    async fn record_file_outcome(
        &self,
        id: Uuid,
        job_id: Uuid,
        outcome: FileOutcome,
    ) -> Result<Option<ProcessTracker>> {
        let mut trackers = lock(&self.trackers);
        let entry = trackers.get_mut(&id).ok_or(Error::TrackerNotFound(id))?;
        if entry.counted_jobs.contains(&job_id)
            || !entry.tracker.apply_outcome(&outcome, Utc::now())
        {
            return Ok(None);
        }
        entry.counted_jobs.insert(job_id);
        Ok(Some(entry.tracker.clone()))
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut trackers = lock(&self.trackers);
        let tracker = &mut trackers.get_mut(&id).ok_or(Error::TrackerNotFound(id))?.tracker;
        if tracker.status.is_terminal() {
            return Ok(false);
        }
        tracker.status = IngestionStatus::Failed;
        tracker.message = Some(message.to_string());
        tracker.completed_at = Some(Utc::now());
        Ok(true)
    }
}

// =============================================================================
// CANDIDATES, REQUIREMENTS, VECTORS
// =============================================================================

/// In-memory candidates; also tracks which candidates have embeddings.
#[derive(Default)]
pub struct MemoryCandidates {
    candidates: Mutex<Vec<Candidate>>,
}

impl MemoryCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ready-made candidate row.
    pub fn insert(&self, candidate: Candidate) {
        lock(&self.candidates).push(candidate);
    }

    pub fn len(&self) -> usize {
        lock(&self.candidates).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CandidateRepository for MemoryCandidates {
    async fn upsert(&self, candidate: NewCandidate) -> Result<Candidate> {
        let email = normalize_email(candidate.email.as_deref());
        let now = Utc::now();
        let mut rows = lock(&self.candidates);

        let existing = rows.iter_mut().find(|c| match &email {
            Some(email) => c.email.as_deref() == Some(email.as_str()),
            None => c.email.is_none() && c.content_hash == candidate.content_hash,
        });

        if let Some(row) = existing {
            row.full_name = candidate.full_name;
            row.phone = candidate.phone.or(row.phone.take());
            row.location = candidate.location.or(row.location.take());
            row.current_title = candidate.current_title.or(row.current_title.take());
            row.years_of_experience = candidate.years_of_experience.or(row.years_of_experience);
            row.skills = candidate.skills;
            row.education = candidate.education.or(row.education.take());
            row.summary = candidate.summary.or(row.summary.take());
            row.experience_summary = candidate
                .experience_summary
                .or(row.experience_summary.take());
            row.resume_text = candidate.resume_text;
            row.content_hash = candidate.content_hash;
            row.source_filename = candidate.source_filename;
            row.is_active = true;
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = Candidate {
            id: new_v7(),
            full_name: candidate.full_name,
            email,
            phone: candidate.phone,
            location: candidate.location,
            current_title: candidate.current_title,
            years_of_experience: candidate.years_of_experience,
            skills: candidate.skills,
            education: candidate.education,
            summary: candidate.summary,
            experience_summary: candidate.experience_summary,
            resume_text: candidate.resume_text,
            content_hash: candidate.content_hash,
            source_filename: candidate.source_filename,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(lock(&self.candidates).iter().find(|c| c.id == id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Candidate>> {
        Ok(lock(&self.candidates)
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    /// Without a vector index attached, every active candidate counts as missing.
    async fn list_missing_embeddings(&self, limit: i64) -> Result<Vec<Uuid>> {
        Ok(lock(&self.candidates)
            .iter()
            .filter(|c| c.is_active)
            .take(limit.max(0) as usize)
            .map(|c| c.id)
            .collect())
    }

    async fn list_active_ids(&self) -> Result<Vec<Uuid>> {
        Ok(lock(&self.candidates)
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect())
    }

    async fn update_skills(&self, id: Uuid, skills: &[String]) -> Result<()> {
        let mut rows = lock(&self.candidates);
        let row = rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("candidate {id}")))?;
        row.skills = skills.to_vec();
        row.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory job requirements.
#[derive(Default)]
pub struct MemoryRequirements {
    requirements: Mutex<HashMap<Uuid, JobRequirement>>,
}

impl MemoryRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, requirement: JobRequirement) {
        lock(&self.requirements).insert(requirement.id, requirement);
    }
}

#[async_trait]
impl JobRequirementRepository for MemoryRequirements {
    async fn get(&self, id: Uuid) -> Result<Option<JobRequirement>> {
        Ok(lock(&self.requirements).get(&id).cloned())
    }
}

/// In-memory similarity index using exact cosine similarity.
#[derive(Default)]
pub struct MemoryVectors {
    vectors: Mutex<HashMap<Uuid, (Vec<f32>, String)>>,
}

impl MemoryVectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored embedding for a candidate.
    pub fn vector_for(&self, candidate_id: Uuid) -> Option<Vec<f32>> {
        lock(&self.vectors).get(&candidate_id).map(|(v, _)| v.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.vectors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

#[async_trait]
impl VectorIndex for MemoryVectors {
    async fn upsert(&self, candidate_id: Uuid, vector: &Vector, model: &str) -> Result<()> {
        lock(&self.vectors).insert(candidate_id, (vector.to_vec(), model.to_string()));
        Ok(())
    }

    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarCandidate>> {
        let query = query.to_vec();
        let mut hits: Vec<SimilarCandidate> = lock(&self.vectors)
            .iter()
            .map(|(id, (v, _))| SimilarCandidate {
                candidate_id: *id,
                score: cosine_similarity(&query, v),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }
}

// =============================================================================
// MATCHES AND AUDITS
// =============================================================================

/// In-memory candidate matches.
#[derive(Default)]
pub struct MemoryMatches {
    matches: Mutex<HashMap<(Uuid, Uuid), CandidateMatch>>,
}

impl MemoryMatches {
    pub fn new() -> Self {
        Self::default()
    }
}

fn best_first(mut matches: Vec<CandidateMatch>) -> Vec<CandidateMatch> {
    matches.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    matches
}

#[async_trait]
impl MatchRepository for MemoryMatches {
    async fn upsert_score(&self, score: &MatchScore) -> Result<CandidateMatch> {
        let now = Utc::now();
        let key = (score.candidate_id, score.job_requirement_id);
        let mut matches = lock(&self.matches);
        let row = matches.entry(key).or_insert_with(|| CandidateMatch {
            id: new_v7(),
            candidate_id: score.candidate_id,
            job_requirement_id: score.job_requirement_id,
            match_score: 0.0,
            skills_score: None,
            experience_score: None,
            education_score: None,
            domain_score: None,
            explanation: None,
            strengths: None,
            gaps: None,
            is_shortlisted: false,
            is_selected: false,
            recruiter_notes: None,
            match_pass: score.match_pass,
            created_at: now,
            updated_at: now,
        });
        row.match_score = clamp_score(score.match_score);
        row.skills_score = score.skills_score.map(clamp_score);
        row.experience_score = score.experience_score.map(clamp_score);
        row.education_score = score.education_score.map(clamp_score);
        row.domain_score = score.domain_score.map(clamp_score);
        row.explanation = score.explanation.clone();
        row.strengths = score.strengths.clone();
        row.gaps = score.gaps.clone();
        row.is_shortlisted = score.is_shortlisted();
        row.match_pass = score.match_pass;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn get(
        &self,
        candidate_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<CandidateMatch>> {
        Ok(lock(&self.matches)
            .get(&(candidate_id, requirement_id))
            .cloned())
    }

    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>> {
        Ok(best_first(
            lock(&self.matches)
                .values()
                .filter(|m| m.job_requirement_id == requirement_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_shortlisted(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>> {
        Ok(best_first(
            lock(&self.matches)
                .values()
                .filter(|m| m.job_requirement_id == requirement_id && m.is_shortlisted)
                .cloned()
                .collect(),
        ))
    }

    async fn update_review(&self, match_id: Uuid, review: MatchReview) -> Result<CandidateMatch> {
        let mut matches = lock(&self.matches);
        let row = matches
            .values_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| Error::NotFound(format!("match {match_id}")))?;
        if let Some(shortlisted) = review.is_shortlisted {
            row.is_shortlisted = shortlisted;
        }
        if let Some(selected) = review.is_selected {
            row.is_selected = selected;
        }
        if let Some(notes) = review.recruiter_notes {
            row.recruiter_notes = Some(notes);
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

/// In-memory match audits.
#[derive(Default)]
pub struct MemoryAudits {
    audits: Mutex<HashMap<Uuid, MatchAudit>>,
}

impl MemoryAudits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<MatchAudit> {
        lock(&self.audits).values().cloned().collect()
    }

    fn close(
        &self,
        audit_id: Uuid,
        status: AuditStatus,
        outcome: &AuditOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        let mut audits = lock(&self.audits);
        let audit = audits
            .get_mut(&audit_id)
            .ok_or_else(|| Error::NotFound(format!("match audit {audit_id}")))?;
        if audit.status != AuditStatus::InProgress {
            return Err(Error::InvalidTransition(format!(
                "match audit {audit_id} is already {}",
                audit.status.as_str()
            )));
        }
        audit.status = status;
        audit.total_candidates = outcome.total_candidates;
        audit.successful_matches = outcome.successful_matches.min(outcome.total_candidates);
        audit.shortlisted_count = outcome.shortlisted_count;
        audit.rematched_count = outcome.rematched_count;
        audit.average_match_score = outcome.average_match_score;
        audit.highest_match_score = outcome.highest_match_score;
        audit.duration_ms = Some(outcome.duration_ms);
        audit.estimated_tokens_used = outcome.estimated_tokens_used;
        audit.error_message = error.map(str::to_string);
        audit.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl MatchAuditRepository for MemoryAudits {
    async fn start(&self, requirement_id: Uuid, initiated_by: Option<&str>) -> Result<MatchAudit> {
        let audit = MatchAudit {
            id: new_v7(),
            job_requirement_id: requirement_id,
            total_candidates: 0,
            successful_matches: 0,
            shortlisted_count: 0,
            rematched_count: 0,
            average_match_score: None,
            highest_match_score: None,
            duration_ms: None,
            estimated_tokens_used: 0,
            status: AuditStatus::InProgress,
            initiated_by: initiated_by.map(str::to_string),
            error_message: None,
            initiated_at: Utc::now(),
            completed_at: None,
        };
        lock(&self.audits).insert(audit.id, audit.clone());
        Ok(audit)
    }

    async fn finish(&self, audit_id: Uuid, outcome: &AuditOutcome) -> Result<()> {
        self.close(audit_id, AuditStatus::Completed, outcome, None)
    }

    async fn fail(&self, audit_id: Uuid, outcome: &AuditOutcome, error: &str) -> Result<()> {
        self.close(audit_id, AuditStatus::Failed, outcome, Some(error))
    }

    async fn get(&self, audit_id: Uuid) -> Result<Option<MatchAudit>> {
        Ok(lock(&self.audits).get(&audit_id).cloned())
    }

    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<MatchAudit>> {
        let mut audits: Vec<MatchAudit> = lock(&self.audits)
            .values()
            .filter(|a| a.job_requirement_id == requirement_id)
            .cloned()
            .collect();
        audits.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        Ok(audits)
    }
}

// =============================================================================
// EXTERNAL PROFILES
// =============================================================================

/// In-memory external profile cache.
#[derive(Default)]
pub struct MemoryProfiles {
    profiles: Mutex<HashMap<(Uuid, String), CandidateExternalProfile>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate a cached row's fetch time, e.g. to expire it.
    pub fn set_fetched_at(&self, candidate_id: Uuid, source: &str, at: DateTime<Utc>) {
        if let Some(profile) = lock(&self.profiles).get_mut(&(candidate_id, source.to_string())) {
            profile.last_fetched_at = Some(at);
        }
    }
}

#[async_trait]
impl ExternalProfileRepository for MemoryProfiles {
    async fn get(
        &self,
        candidate_id: Uuid,
        source: &str,
    ) -> Result<Option<CandidateExternalProfile>> {
        Ok(lock(&self.profiles)
            .get(&(candidate_id, source.to_string()))
            .cloned())
    }

    async fn upsert(&self, profile: ProfileUpsert) -> Result<CandidateExternalProfile> {
        let now = Utc::now();
        let mut profiles = lock(&self.profiles);
        let row = profiles
            .entry((profile.candidate_id, profile.source.clone()))
            .or_insert_with(|| CandidateExternalProfile {
                id: new_v7(),
                candidate_id: profile.candidate_id,
                source: profile.source.clone(),
                status: profile.status,
                profile_url: None,
                raw_data: None,
                enriched_summary: None,
                error_message: None,
                last_fetched_at: None,
                created_at: now,
                updated_at: now,
            });
        row.status = profile.status;
        row.profile_url = profile.profile_url;
        row.raw_data = profile.raw_data;
        row.enriched_summary = profile.enriched_summary;
        row.error_message = profile.error_message;
        row.last_fetched_at = Some(profile.fetched_at);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn list_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<CandidateExternalProfile>> {
        let mut rows: Vec<CandidateExternalProfile> = lock(&self.profiles)
            .values()
            .filter(|p| p.candidate_id == candidate_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(rows)
    }

    async fn list_failed(&self, limit: i64) -> Result<Vec<CandidateExternalProfile>> {
        let mut rows: Vec<CandidateExternalProfile> = lock(&self.profiles)
            .values()
            .filter(|p| p.status.is_failure())
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.last_fetched_at);
        rows.truncate(limit.max(1) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hireflow_core::JobPriority;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_queue_claim_order_and_fencing() {
        let queue = MemoryJobQueue::new();
        let low = queue
            .enqueue(
                NewJob::new(JobType::ResumeProcessing, json!({})).with_priority(JobPriority::Low),
            )
            .await
            .unwrap();
        let urgent = queue
            .enqueue(
                NewJob::new(JobType::ResumeProcessing, json!({}))
                    .with_priority(JobPriority::Urgent),
            )
            .await
            .unwrap();

        let claimed = queue
            .claim_next(JobType::ResumeProcessing, 5, "w1")
            .await
            .unwrap();
        assert_eq!(
            claimed.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![urgent, low]
        );
        assert!(!queue.complete(low, "w2", None).await.unwrap());
        assert!(queue.complete(low, "w1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_queue_stale_cycle_matches_postgres_rules() {
        let queue = MemoryJobQueue::new();
        let id = queue
            .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
            .await
            .unwrap();
        for _ in 0..4 {
            queue
                .claim_next(JobType::BatchEmbedding, 1, "w1")
                .await
                .unwrap();
            queue.set_heartbeat(id, Utc::now() - Duration::minutes(10));
            queue
                .reclaim_stale(Utc::now() - Duration::seconds(120))
                .await
                .unwrap();
        }
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 4);
        assert!(job.is_dead_lettered());
    }

    #[tokio::test]
    async fn test_memory_profiles_failed_listing() {
        let profiles = MemoryProfiles::new();
        let candidate_id = Uuid::new_v4();
        profiles
            .upsert(ProfileUpsert {
                candidate_id,
                source: "web_search".to_string(),
                status: hireflow_core::ProfileStatus::NotFound,
                profile_url: None,
                raw_data: None,
                enriched_summary: None,
                error_message: None,
                fetched_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(profiles.list_failed(10).await.unwrap().len(), 1);
    }
}
