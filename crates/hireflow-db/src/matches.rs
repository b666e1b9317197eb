//! Candidate match and match audit repositories.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hireflow_core::{
    new_v7, AuditOutcome, AuditStatus, CandidateMatch, Error, MatchAudit, MatchAuditRepository,
    MatchRepository, MatchReview, MatchScore, Result,
};

const MATCH_COLUMNS: &str = "id, candidate_id, job_requirement_id, match_score, skills_score, \
     experience_score, education_score, domain_score, explanation, strengths, gaps, \
     is_shortlisted, is_selected, recruiter_notes, match_pass, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, job_requirement_id, total_candidates, successful_matches, \
     shortlisted_count, rematched_count, average_match_score, highest_match_score, duration_ms, \
     estimated_tokens_used, status, initiated_by, error_message, initiated_at, completed_at";

/// Clamp a score into the 0..=100 range stored in the table.
pub(crate) fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// PostgreSQL implementation of MatchRepository.
#[derive(Clone)]
pub struct PgMatchRepository {
    pool: Pool<Postgres>,
}

impl PgMatchRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<CandidateMatch> {
        Ok(CandidateMatch {
            id: row.try_get("id")?,
            candidate_id: row.try_get("candidate_id")?,
            job_requirement_id: row.try_get("job_requirement_id")?,
            match_score: row.try_get("match_score")?,
            skills_score: row.try_get("skills_score")?,
            experience_score: row.try_get("experience_score")?,
            education_score: row.try_get("education_score")?,
            domain_score: row.try_get("domain_score")?,
            explanation: row.try_get("explanation")?,
            strengths: row.try_get("strengths")?,
            gaps: row.try_get("gaps")?,
            is_shortlisted: row.try_get("is_shortlisted")?,
            is_selected: row.try_get("is_selected")?,
            recruiter_notes: row.try_get("recruiter_notes")?,
            match_pass: row.try_get("match_pass")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn upsert_score(&self, score: &MatchScore) -> Result<CandidateMatch> {
        // is_selected and recruiter_notes belong to the recruiter and survive re-scoring.
        let query = format!(
            "INSERT INTO candidate_match (id, candidate_id, job_requirement_id, match_score,
                                          skills_score, experience_score, education_score,
                                          domain_score, explanation, strengths, gaps,
                                          is_shortlisted, match_pass, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
             ON CONFLICT (candidate_id, job_requirement_id) DO UPDATE SET
                 match_score = EXCLUDED.match_score,
                 skills_score = EXCLUDED.skills_score,
                 experience_score = EXCLUDED.experience_score,
                 education_score = EXCLUDED.education_score,
                 domain_score = EXCLUDED.domain_score,
                 explanation = EXCLUDED.explanation,
                 strengths = EXCLUDED.strengths,
                 gaps = EXCLUDED.gaps,
                 is_shortlisted = EXCLUDED.is_shortlisted,
                 match_pass = EXCLUDED.match_pass,
                 updated_at = EXCLUDED.updated_at
             RETURNING {MATCH_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(score.candidate_id)
            .bind(score.job_requirement_id)
            .bind(clamp_score(score.match_score))
            .bind(score.skills_score.map(clamp_score))
            .bind(score.experience_score.map(clamp_score))
            .bind(score.education_score.map(clamp_score))
            .bind(score.domain_score.map(clamp_score))
            .bind(&score.explanation)
            .bind(&score.strengths)
            .bind(&score.gaps)
            .bind(score.is_shortlisted())
            .bind(score.match_pass)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(
        &self,
        candidate_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<CandidateMatch>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM candidate_match
             WHERE candidate_id = $1 AND job_requirement_id = $2"
        );
        let row = sqlx::query(&query)
            .bind(candidate_id)
            .bind(requirement_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM candidate_match
             WHERE job_requirement_id = $1
             ORDER BY match_score DESC, updated_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(requirement_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_shortlisted(&self, requirement_id: Uuid) -> Result<Vec<CandidateMatch>> {
        let query = format!(
            "SELECT {MATCH_COLUMNS} FROM candidate_match
             WHERE job_requirement_id = $1 AND is_shortlisted
             ORDER BY match_score DESC, updated_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(requirement_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn update_review(&self, match_id: Uuid, review: MatchReview) -> Result<CandidateMatch> {
        let query = format!(
            "UPDATE candidate_match SET
                 is_shortlisted = COALESCE($2, is_shortlisted),
                 is_selected = COALESCE($3, is_selected),
                 recruiter_notes = COALESCE($4, recruiter_notes),
                 updated_at = $5
             WHERE id = $1
             RETURNING {MATCH_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(match_id)
            .bind(review.is_shortlisted)
            .bind(review.is_selected)
            .bind(&review.recruiter_notes)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("candidate match {match_id}")))?;

        Self::parse_row(&row)
    }
}

/// PostgreSQL implementation of MatchAuditRepository.
#[derive(Clone)]
pub struct PgMatchAuditRepository {
    pool: Pool<Postgres>,
}

impl PgMatchAuditRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<MatchAudit> {
        let status: String = row.try_get("status")?;
        Ok(MatchAudit {
            id: row.try_get("id")?,
            job_requirement_id: row.try_get("job_requirement_id")?,
            total_candidates: row.try_get("total_candidates")?,
            successful_matches: row.try_get("successful_matches")?,
            shortlisted_count: row.try_get("shortlisted_count")?,
            rematched_count: row.try_get("rematched_count")?,
            average_match_score: row.try_get("average_match_score")?,
            highest_match_score: row.try_get("highest_match_score")?,
            duration_ms: row.try_get("duration_ms")?,
            estimated_tokens_used: row.try_get("estimated_tokens_used")?,
            status: AuditStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("unknown audit status '{status}'")))?,
            initiated_by: row.try_get("initiated_by")?,
            error_message: row.try_get("error_message")?,
            initiated_at: row.try_get("initiated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn close(
        &self,
        audit_id: Uuid,
        status: AuditStatus,
        outcome: &AuditOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE match_audit SET
                 status = $2, total_candidates = $3, successful_matches = $4,
                 shortlisted_count = $5, rematched_count = $6, average_match_score = $7,
                 highest_match_score = $8, duration_ms = $9, estimated_tokens_used = $10,
                 error_message = $11, completed_at = $12
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(audit_id)
        .bind(status.as_str())
        .bind(outcome.total_candidates)
        .bind(outcome.successful_matches.min(outcome.total_candidates))
        .bind(outcome.shortlisted_count)
        .bind(outcome.rematched_count)
        .bind(outcome.average_match_score)
        .bind(outcome.highest_match_score)
        .bind(outcome.duration_ms)
        .bind(outcome.estimated_tokens_used)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::InvalidTransition(format!(
                "match audit {audit_id} is not in progress"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchAuditRepository for PgMatchAuditRepository {
    async fn start(
        &self,
        requirement_id: Uuid,
        initiated_by: Option<&str>,
    ) -> Result<MatchAudit> {
        let query = format!(
            "INSERT INTO match_audit (id, job_requirement_id, status, initiated_by, initiated_at)
             VALUES ($1, $2, 'in_progress', $3, $4)
             RETURNING {AUDIT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(requirement_id)
            .bind(initiated_by)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn finish(&self, audit_id: Uuid, outcome: &AuditOutcome) -> Result<()> {
        self.close(audit_id, AuditStatus::Completed, outcome, None)
            .await
    }

    async fn fail(&self, audit_id: Uuid, outcome: &AuditOutcome, error: &str) -> Result<()> {
        self.close(audit_id, AuditStatus::Failed, outcome, Some(error))
            .await
    }

    async fn get(&self, audit_id: Uuid) -> Result<Option<MatchAudit>> {
        let query = format!("SELECT {AUDIT_COLUMNS} FROM match_audit WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(audit_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list_for_requirement(&self, requirement_id: Uuid) -> Result<Vec<MatchAudit>> {
        let query = format!(
            "SELECT {AUDIT_COLUMNS} FROM match_audit
             WHERE job_requirement_id = $1
             ORDER BY initiated_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(requirement_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }
}
