//! External profile cache repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hireflow_core::{
    new_v7, CandidateExternalProfile, Error, ExternalProfileRepository, ProfileStatus,
    ProfileUpsert, Result,
};

const PROFILE_COLUMNS: &str = "id, candidate_id, source, status, profile_url, raw_data, \
     enriched_summary, error_message, last_fetched_at, created_at, updated_at";

/// PostgreSQL implementation of ExternalProfileRepository.
#[derive(Clone)]
pub struct PgExternalProfileRepository {
    pool: Pool<Postgres>,
}

impl PgExternalProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<CandidateExternalProfile> {
        let status: String = row.try_get("status")?;
        Ok(CandidateExternalProfile {
            id: row.try_get("id")?,
            candidate_id: row.try_get("candidate_id")?,
            source: row.try_get("source")?,
            status: ProfileStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("unknown profile status '{status}'")))?,
            profile_url: row.try_get("profile_url")?,
            raw_data: row.try_get("raw_data")?,
            enriched_summary: row.try_get("enriched_summary")?,
            error_message: row.try_get("error_message")?,
            last_fetched_at: row.try_get("last_fetched_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ExternalProfileRepository for PgExternalProfileRepository {
    async fn get(
        &self,
        candidate_id: Uuid,
        source: &str,
    ) -> Result<Option<CandidateExternalProfile>> {
        let query = format!(
            "SELECT {PROFILE_COLUMNS} FROM candidate_external_profile
             WHERE candidate_id = $1 AND source = $2"
        );
        let row = sqlx::query(&query)
            .bind(candidate_id)
            .bind(source)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn upsert(&self, profile: ProfileUpsert) -> Result<CandidateExternalProfile> {
        let query = format!(
            "INSERT INTO candidate_external_profile (id, candidate_id, source, status,
                                                     profile_url, raw_data, enriched_summary,
                                                     error_message, last_fetched_at,
                                                     created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             ON CONFLICT (candidate_id, source) DO UPDATE SET
                 status = EXCLUDED.status,
                 profile_url = EXCLUDED.profile_url,
                 raw_data = EXCLUDED.raw_data,
                 enriched_summary = EXCLUDED.enriched_summary,
                 error_message = EXCLUDED.error_message,
                 last_fetched_at = EXCLUDED.last_fetched_at,
                 updated_at = EXCLUDED.updated_at
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(profile.candidate_id)
            .bind(&profile.source)
            .bind(profile.status.as_str())
            .bind(&profile.profile_url)
            .bind(&profile.raw_data)
            .bind(&profile.enriched_summary)
            .bind(&profile.error_message)
            .bind(profile.fetched_at)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn list_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<CandidateExternalProfile>> {
        let query = format!(
            "SELECT {PROFILE_COLUMNS} FROM candidate_external_profile
             WHERE candidate_id = $1 ORDER BY source ASC"
        );
        let rows = sqlx::query(&query)
            .bind(candidate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_failed(&self, limit: i64) -> Result<Vec<CandidateExternalProfile>> {
        let query = format!(
            "SELECT {PROFILE_COLUMNS} FROM candidate_external_profile
             WHERE status IN ('failed', 'not_found')
             ORDER BY last_fetched_at ASC NULLS FIRST
             LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }
}
