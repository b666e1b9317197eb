//! DATA_MIGRATION: one-off maintenance operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use hireflow_core::{
    defaults, CandidateRepository, Job, JobRepository, JobType, NewJob, Result,
};
use hireflow_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::handlers::batch_embedding::BatchEmbeddingPayload;
use crate::resume::normalize_skills;

/// Payload of a DATA_MIGRATION job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMigrationPayload {
    pub operation: MigrationOperation,
    /// Candidates per fanned-out job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOperation {
    /// Lowercase, trim and dedupe every active candidate's skills.
    NormalizeSkills,
    /// Re-embed every active candidate through BATCH_EMBEDDING jobs.
    ReembedAll,
}

pub struct DataMigrationHandler {
    jobs: Arc<dyn JobRepository>,
    candidates: Arc<dyn CandidateRepository>,
}

impl DataMigrationHandler {
    pub fn new(jobs: Arc<dyn JobRepository>, candidates: Arc<dyn CandidateRepository>) -> Self {
        Self { jobs, candidates }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(Arc::new(db.jobs.clone()), Arc::new(db.candidates.clone()))
    }

    async fn normalize_skills(&self) -> Result<JsonValue> {
        let candidates = self.candidates.list_active().await?;
        let mut updated = 0usize;
        for candidate in &candidates {
            let normalized = normalize_skills(&candidate.skills);
            if normalized != candidate.skills {
                self.candidates
                    .update_skills(candidate.id, &normalized)
                    .await?;
                updated += 1;
            }
        }
        Ok(json!({
            "operation": "normalize_skills",
            "scanned": candidates.len(),
            "updated": updated,
        }))
    }

    /// Fan out BATCH_EMBEDDING jobs sharing this job's correlation id.
    async fn reembed_all(&self, job: &Job, batch_size: usize) -> Result<JsonValue> {
        let ids = self.candidates.list_active_ids().await?;
        let correlation_id = job.correlation_id.unwrap_or(job.id);

        let mut created = Vec::new();
        for chunk in ids.chunks(batch_size) {
            let payload = serde_json::to_value(BatchEmbeddingPayload {
                candidate_ids: chunk.to_vec(),
            })?;
            let job_id = self
                .jobs
                .enqueue(
                    NewJob::new(JobType::BatchEmbedding, payload)
                        .with_priority(job.priority)
                        .with_correlation_id(correlation_id),
                )
                .await?;
            created.push(job_id);
        }
        Ok(json!({
            "operation": "reembed_all",
            "candidates": ids.len(),
            "jobs_created": created.len(),
            "job_ids": created,
            "correlation_id": correlation_id,
        }))
    }
}

#[async_trait]
impl JobHandler for DataMigrationHandler {
    fn job_type(&self) -> JobType {
        JobType::DataMigration
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: DataMigrationPayload = match ctx.parse_payload() {
            Ok(payload) => payload,
            Err(e) => return JobResult::from_error(&e),
        };
        let batch_size = payload
            .batch_size
            .unwrap_or(defaults::EMBEDDING_BATCH_SIZE)
            .max(1);

        let outcome = match payload.operation {
            MigrationOperation::NormalizeSkills => self.normalize_skills().await,
            MigrationOperation::ReembedAll => self.reembed_all(&ctx.job, batch_size).await,
        };

        match outcome {
            Ok(result) => {
                info!(
                    subsystem = "jobs",
                    component = "data_migration",
                    job_id = %ctx.job_id(),
                    operation = ?payload.operation,
                    %result,
                    "Data migration finished"
                );
                JobResult::Success(Some(result))
            }
            Err(e) => JobResult::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_operations() {
        let payload: DataMigrationPayload =
            serde_json::from_value(json!({ "operation": "reembed_all", "batch_size": 10 }))
                .unwrap();
        assert_eq!(payload.operation, MigrationOperation::ReembedAll);
        assert_eq!(payload.batch_size, Some(10));

        let payload: DataMigrationPayload =
            serde_json::from_value(json!({ "operation": "normalize_skills" })).unwrap();
        assert_eq!(payload.operation, MigrationOperation::NormalizeSkills);
        assert!(payload.batch_size.is_none());

        assert!(serde_json::from_value::<DataMigrationPayload>(json!({ "operation": "drop_all" }))
            .is_err());
    }
}
