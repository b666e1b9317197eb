//! BATCH_EMBEDDING: (re)compute candidate embeddings.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use hireflow_core::{
    defaults, CandidateRepository, EmbeddingBackend, JobType, Result, VectorIndex,
};
use hireflow_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Most candidates one job backfills when no ids are given.
pub const BACKFILL_LIMIT: i64 = 10_000;

/// Payload of a BATCH_EMBEDDING job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEmbeddingPayload {
    /// Candidates to embed; empty means every active candidate without one.
    #[serde(default)]
    pub candidate_ids: Vec<Uuid>,
}

/// Counts reported in the job result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingTally {
    pub embedded: usize,
    pub skipped: usize,
}

pub struct BatchEmbeddingHandler {
    candidates: Arc<dyn CandidateRepository>,
    vectors: Arc<dyn VectorIndex>,
    embeddings: Arc<dyn EmbeddingBackend>,
    chunk_size: usize,
}

impl BatchEmbeddingHandler {
    pub fn new(
        candidates: Arc<dyn CandidateRepository>,
        vectors: Arc<dyn VectorIndex>,
        embeddings: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            candidates,
            vectors,
            embeddings,
            chunk_size: defaults::EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn from_database(db: &Database, embeddings: Arc<dyn EmbeddingBackend>) -> Self {
        Self::new(
            Arc::new(db.candidates.clone()),
            Arc::new(db.vectors.clone()),
            embeddings,
        )
    }

    /// Texts per embedding request.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Embed the given candidates; unknown, inactive or empty ones are skipped.
    pub async fn embed_candidates(&self, ids: &[Uuid]) -> Result<EmbeddingTally> {
        let mut tally = EmbeddingTally::default();

        for chunk in ids.chunks(self.chunk_size) {
            let mut batch = Vec::with_capacity(chunk.len());
            for id in chunk {
                match self.candidates.get(*id).await? {
                    Some(c) if c.is_active && !c.resume_text.trim().is_empty() => {
                        batch.push((c.id, c.resume_text));
                    }
                    _ => {
                        debug!(candidate_id = %id, "Skipping candidate without embeddable text");
                        tally.skipped += 1;
                    }
                }
            }
            if batch.is_empty() {
                continue;
            }

            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embeddings.embed_texts(&texts).await?;
            for ((candidate_id, _), vector) in batch.iter().zip(vectors.iter()) {
                self.vectors
                    .upsert(*candidate_id, vector, self.embeddings.model_name())
                    .await?;
                tally.embedded += 1;
            }
        }
        Ok(tally)
    }
}

#[async_trait]
impl JobHandler for BatchEmbeddingHandler {
    fn job_type(&self) -> JobType {
        JobType::BatchEmbedding
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: BatchEmbeddingPayload = match ctx.parse_payload() {
            Ok(payload) => payload,
            Err(e) => return JobResult::from_error(&e),
        };

        let ids = if payload.candidate_ids.is_empty() {
            match self.candidates.list_missing_embeddings(BACKFILL_LIMIT).await {
                Ok(ids) => ids,
                Err(e) => return JobResult::from_error(&e),
            }
        } else {
            payload.candidate_ids
        };

        match self.embed_candidates(&ids).await {
            Ok(tally) => {
                info!(
                    subsystem = "ingestion",
                    component = "batch_embedding",
                    job_id = %ctx.job_id(),
                    embedded = tally.embedded,
                    skipped = tally.skipped,
                    model = self.embeddings.model_name(),
                    "Batch embedding finished"
                );
                JobResult::Success(Some(json!({
                    "embedded": tally.embedded,
                    "skipped": tally.skipped,
                })))
            }
            Err(e) => JobResult::from_error(&e),
        }
    }
}
