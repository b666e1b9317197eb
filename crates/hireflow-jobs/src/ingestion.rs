//! Upload batch submission and dead-letter bookkeeping for the ingestion pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use hireflow_core::{
    FileOutcome, Job, JobPriority, JobRepository, JobStatus, JobType, NewJob, Result,
    TrackerRepository,
};

use crate::handlers::ResumeJobPayload;
use crate::reclaimer::DeadLetterHook;

/// One stored file of an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Path relative to the storage root.
    pub file_path: String,
    /// Name the user uploaded the file under.
    pub original_filename: Option<String>,
}

impl UploadedFile {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            original_filename: None,
        }
    }

    pub fn with_original_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = Some(name.into());
        self
    }
}

/// Tracker and jobs created for one upload.
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub tracker_id: Uuid,
    pub job_ids: Vec<Uuid>,
}

/// Create a tracker for an upload and enqueue one RESUME_PROCESSING job per file.
///
/// Jobs share the tracker id as correlation id. If enqueueing fails part way,
/// the tracker is marked failed, since it could never resolve all its files.
pub async fn submit_upload_batch(
    jobs: &dyn JobRepository,
    trackers: &dyn TrackerRepository,
    uploaded_filename: &str,
    files: &[UploadedFile],
    priority: JobPriority,
) -> Result<BatchSubmission> {
    let total = i32::try_from(files.len()).map_err(|_| {
        hireflow_core::Error::InvalidInput(format!("Too many files in one upload: {}", files.len()))
    })?;
    let tracker = trackers.create(uploaded_filename, total).await?;

    let mut job_ids = Vec::with_capacity(files.len());
    for file in files {
        let payload = serde_json::to_value(ResumeJobPayload {
            tracker_id: tracker.id,
            file_path: file.file_path.clone(),
            original_filename: file.original_filename.clone(),
        })?;
        let job = NewJob::new(JobType::ResumeProcessing, payload)
            .with_priority(priority)
            .with_correlation_id(tracker.id);

        match jobs.enqueue(job).await {
            Ok(job_id) => job_ids.push(job_id),
            Err(e) => {
                error!(
                    subsystem = "ingestion",
                    component = "submit",
                    tracker_id = %tracker.id,
                    queued = job_ids.len(),
                    error = %e,
                    "Failed to enqueue upload batch"
                );
                let message = format!("Failed to enqueue file {}: {}", file.file_path, e);
                if let Err(mark_err) = trackers.mark_failed(tracker.id, &message).await {
                    error!(tracker_id = %tracker.id, error = %mark_err, "Failed to mark tracker failed");
                }
                return Err(e);
            }
        }
    }

    info!(
        subsystem = "ingestion",
        component = "submit",
        tracker_id = %tracker.id,
        uploaded_filename,
        files = job_ids.len(),
        "Upload batch submitted"
    );
    Ok(BatchSubmission {
        tracker_id: tracker.id,
        job_ids,
    })
}

/// Open trackers inspected per reconcile pass.
const RECONCILE_TRACKER_LIMIT: i64 = 100;

/// Resolves a dead-lettered resume job as a failed file on its tracker,
/// so the batch still completes when a worker crashed on its last attempt.
///
/// The dead-letter commits before hooks run, so a hook error or a process
/// exit in between would leave the file unresolved. [`reconcile`] runs every
/// sweep and counts any FAILED resume job of an open tracker; trackers count
/// each job once, so files already resolved are skipped.
///
/// [`reconcile`]: DeadLetterHook::reconcile
pub struct TrackerDeadLetterHook {
    jobs: Arc<dyn JobRepository>,
    trackers: Arc<dyn TrackerRepository>,
}

impl TrackerDeadLetterHook {
    pub fn new(jobs: Arc<dyn JobRepository>, trackers: Arc<dyn TrackerRepository>) -> Self {
        Self { jobs, trackers }
    }

    /// Count a failed resume job on its tracker. Returns true when the
    /// tracker changed.
    async fn resolve_failed_job(&self, job: &Job) -> Result<bool> {
        if job.job_type != JobType::ResumeProcessing {
            return Ok(false);
        }
        let payload: ResumeJobPayload = match job
            .payload
            .clone()
            .map(serde_json::from_value::<ResumeJobPayload>)
            .transpose()
        {
            Ok(Some(payload)) => payload,
            Ok(None) | Err(_) => {
                warn!(job_id = %job.id, "Dead-lettered resume job has no tracker payload");
                return Ok(false);
            }
        };

        let reason = format!(
            "{}: {}",
            payload.display_name(),
            job.error_message
                .as_deref()
                .unwrap_or(hireflow_core::defaults::RETRIES_EXHAUSTED_MESSAGE)
        );
        let updated = self
            .trackers
            .record_file_outcome(payload.tracker_id, job.id, FileOutcome::Failed { reason })
            .await?;
        Ok(updated.is_some())
    }
}

#[async_trait]
impl DeadLetterHook for TrackerDeadLetterHook {
    async fn on_dead_letter(&self, job: &Job) -> Result<()> {
        self.resolve_failed_job(job).await.map(|_| ())
    }

    async fn reconcile(&self) -> Result<usize> {
        let mut resolved = 0;
        for tracker in self.trackers.list_open(RECONCILE_TRACKER_LIMIT).await? {
            let failed = self
                .jobs
                .list_by_correlation(tracker.id)
                .await?
                .into_iter()
                .filter(|job| job.status == JobStatus::Failed);
            for job in failed {
                if self.resolve_failed_job(&job).await? {
                    resolved += 1;
                    warn!(
                        subsystem = "ingestion",
                        component = "dead_letter_hook",
                        op = "reconcile",
                        tracker_id = %tracker.id,
                        job_id = %job.id,
                        "Resolved failed file missed by an earlier sweep"
                    );
                }
            }
        }
        Ok(resolved)
    }
}
