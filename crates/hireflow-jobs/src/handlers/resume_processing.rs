//! RESUME_PROCESSING: one uploaded resume file through the ingestion stages.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use hireflow_core::{
    defaults, Candidate, CandidateRepository, EmbeddingBackend, Error, FileOutcome,
    GenerationBackend, IngestionStatus, JobType, Result, TrackerRepository, VectorIndex,
};
use hireflow_db::Database;

use crate::extraction::ExtractionRegistry;
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::resume::ResumeAnalyzer;

/// Payload of a RESUME_PROCESSING job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeJobPayload {
    /// Upload batch this file belongs to.
    pub tracker_id: Uuid,
    /// Path of the stored file, relative to the storage root.
    pub file_path: String,
    /// Name the file was uploaded under, if different from the stored name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

impl ResumeJobPayload {
    /// Name used for format detection and candidate fallback naming.
    pub fn display_name(&self) -> String {
        self.original_filename.clone().unwrap_or_else(|| {
            Path::new(&self.file_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.file_path.clone())
        })
    }
}

/// Resolve a stored file path under the storage root.
///
/// Absolute paths and parent-directory components are rejected so a payload
/// cannot point outside the upload directory.
pub fn resolve_upload_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.trim().is_empty() || escapes {
        return Err(Error::InvalidInput(format!(
            "Upload path must be relative to the storage root: '{}'",
            relative
        )));
    }
    Ok(root.join(path))
}

/// Drives one resume through extraction, embedding, analysis and indexing,
/// then resolves the file on its batch tracker.
///
/// The similarity index is keyed by candidate id, so the candidate is
/// upserted before the vector write. Tracker stages still advance in their
/// declared order. The file is resolved on success, on a permanent failure,
/// or on the last transient failure; the tracker counts each job once, so a
/// re-run after a lost claim does not count the file again.
pub struct ResumeProcessingHandler {
    storage_root: PathBuf,
    extraction: Arc<ExtractionRegistry>,
    embeddings: Arc<dyn EmbeddingBackend>,
    analyzer: ResumeAnalyzer,
    trackers: Arc<dyn TrackerRepository>,
    candidates: Arc<dyn CandidateRepository>,
    vectors: Arc<dyn VectorIndex>,
}

impl ResumeProcessingHandler {
    pub fn new(
        trackers: Arc<dyn TrackerRepository>,
        candidates: Arc<dyn CandidateRepository>,
        vectors: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingBackend>,
        llm: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            storage_root: PathBuf::from(defaults::RESUME_STORAGE_PATH),
            extraction: Arc::new(ExtractionRegistry::with_defaults()),
            embeddings,
            analyzer: ResumeAnalyzer::new(llm),
            trackers,
            candidates,
            vectors,
        }
    }

    /// Handler over the PostgreSQL repositories.
    pub fn from_database(
        db: &Database,
        embeddings: Arc<dyn EmbeddingBackend>,
        llm: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self::new(
            Arc::new(db.trackers.clone()),
            Arc::new(db.candidates.clone()),
            Arc::new(db.vectors.clone()),
            embeddings,
            llm,
        )
    }

    /// Directory uploaded files are stored under.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_extraction(mut self, registry: Arc<ExtractionRegistry>) -> Self {
        self.extraction = registry;
        self
    }

    #[instrument(
        skip(self, payload),
        fields(subsystem = "ingestion", component = "resume_handler", tracker_id = %payload.tracker_id)
    )]
    async fn process(&self, payload: &ResumeJobPayload) -> Result<Candidate> {
        let filename = payload.display_name();
        let path = resolve_upload_path(&self.storage_root, &payload.file_path)?;
        let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::InvalidInput(format!("Uploaded file not found: {}", payload.file_path))
            }
            _ => Error::Io(e),
        })?;

        let text = self.extraction.extract(&data, &filename).await?;

        let embedding = self
            .embeddings
            .embed_texts(std::slice::from_ref(&text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Embedding backend returned no vector".into()))?;
        self.trackers
            .advance_stage(payload.tracker_id, IngestionStatus::EmbedGenerated)
            .await?;

        let parsed = self.analyzer.analyze(&text).await?;
        let candidate = self
            .candidates
            .upsert(parsed.into_candidate(&text, Some(&filename)))
            .await?;

        self.vectors
            .upsert(candidate.id, &embedding, self.embeddings.model_name())
            .await?;
        self.trackers
            .advance_stage(payload.tracker_id, IngestionStatus::VectorDbUpdated)
            .await?;
        self.trackers
            .advance_stage(payload.tracker_id, IngestionStatus::ResumeAnalyzed)
            .await?;

        Ok(candidate)
    }

    /// Resolve the file on its tracker; a bookkeeping failure is only logged.
    async fn resolve_file(&self, tracker_id: Uuid, job_id: Uuid, outcome: FileOutcome) {
        match self
            .trackers
            .record_file_outcome(tracker_id, job_id, outcome)
            .await
        {
            Ok(Some(tracker)) if tracker.status.is_terminal() => {
                info!(
                    subsystem = "ingestion",
                    component = "resume_handler",
                    %tracker_id,
                    status = tracker.status.as_str(),
                    "Last file of batch resolved"
                );
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    %tracker_id,
                    %job_id,
                    "File outcome ignored, job already counted or batch resolved"
                );
            }
            Err(e) => {
                error!(%tracker_id, error = %e, "Failed to record file outcome");
            }
        }
    }
}

#[async_trait]
impl JobHandler for ResumeProcessingHandler {
    fn job_type(&self) -> JobType {
        JobType::ResumeProcessing
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: ResumeJobPayload = match ctx.parse_payload() {
            Ok(payload) => payload,
            Err(e) => return JobResult::from_error(&e),
        };
        let start = Instant::now();

        match self.process(&payload).await {
            Ok(candidate) => {
                self.resolve_file(payload.tracker_id, ctx.job_id(), FileOutcome::Processed)
                    .await;
                info!(
                    subsystem = "ingestion",
                    component = "resume_handler",
                    job_id = %ctx.job_id(),
                    tracker_id = %payload.tracker_id,
                    candidate_id = %candidate.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Resume processed"
                );
                JobResult::Success(Some(json!({
                    "candidate_id": candidate.id,
                    "tracker_id": payload.tracker_id,
                })))
            }
            Err(e) => {
                let transient = e.is_transient();
                let reason = format!("{}: {}", payload.display_name(), e);
                if !transient || !ctx.has_retries_left() {
                    self.resolve_file(
                        payload.tracker_id,
                        ctx.job_id(),
                        FileOutcome::Failed {
                            reason: reason.clone(),
                        },
                    )
                    .await;
                }
                warn!(
                    subsystem = "ingestion",
                    component = "resume_handler",
                    job_id = %ctx.job_id(),
                    tracker_id = %payload.tracker_id,
                    transient,
                    retry_count = ctx.job.retry_count,
                    error = %e,
                    "Resume processing failed"
                );
                if transient {
                    JobResult::Retry(reason)
                } else {
                    JobResult::Failed(reason)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_upload_path() {
        let root = Path::new("/srv/uploads");
        assert_eq!(
            resolve_upload_path(root, "batch-1/ada.pdf").unwrap(),
            PathBuf::from("/srv/uploads/batch-1/ada.pdf")
        );
        assert!(resolve_upload_path(root, "../etc/passwd").is_err());
        assert!(resolve_upload_path(root, "/etc/passwd").is_err());
        assert!(resolve_upload_path(root, "a/../../b").is_err());
        assert!(resolve_upload_path(root, "  ").is_err());
    }

    #[test]
    fn test_display_name_prefers_original() {
        let payload = ResumeJobPayload {
            tracker_id: Uuid::new_v4(),
            file_path: "batch/0001.pdf".to_string(),
            original_filename: Some("Ada Lovelace.pdf".to_string()),
        };
        assert_eq!(payload.display_name(), "Ada Lovelace.pdf");

        let payload = ResumeJobPayload {
            original_filename: None,
            ..payload
        };
        assert_eq!(payload.display_name(), "0001.pdf");
    }

    #[test]
    fn test_payload_round_trip_omits_missing_filename() {
        let payload = ResumeJobPayload {
            tracker_id: Uuid::nil(),
            file_path: "a.txt".to_string(),
            original_filename: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("original_filename").is_none());
    }
}
