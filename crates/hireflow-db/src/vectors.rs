//! Candidate embedding storage and similarity search (pgvector).

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hireflow_core::{Error, Result, SimilarCandidate, VectorIndex};

/// PostgreSQL implementation of VectorIndex.
#[derive(Clone)]
pub struct PgVectorIndex {
    pool: Pool<Postgres>,
}

impl PgVectorIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Whether a candidate has a stored embedding.
    pub async fn has_embedding(&self, candidate_id: Uuid) -> Result<bool> {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT candidate_id FROM candidate_embedding WHERE candidate_id = $1",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, candidate_id: Uuid, vector: &Vector, model: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO candidate_embedding (candidate_id, vector, model, created_at)
             VALUES ($1, $2::vector, $3, $4)
             ON CONFLICT (candidate_id) DO UPDATE SET
                 vector = EXCLUDED.vector, model = EXCLUDED.model, created_at = EXCLUDED.created_at",
        )
        .bind(candidate_id)
        .bind(vector)
        .bind(model)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarCandidate>> {
        let rows = sqlx::query(
            "SELECT e.candidate_id, 1.0 - (e.vector <=> $1::vector) AS score
             FROM candidate_embedding e
             JOIN candidate c ON c.id = e.candidate_id
             WHERE c.is_active
             ORDER BY e.vector <=> $1::vector
             LIMIT $2",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| -> Result<SimilarCandidate> {
                Ok(SimilarCandidate {
                    candidate_id: row.try_get("candidate_id")?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }
}
