//! Candidate and job requirement repositories.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hireflow_core::{
    new_v7, Candidate, CandidateRepository, Error, JobRequirement, JobRequirementRepository,
    NewCandidate, Result,
};

const CANDIDATE_COLUMNS: &str = "id, full_name, email, phone, location, current_title, \
     years_of_experience, skills, education, summary, experience_summary, resume_text, \
     content_hash, source_filename, is_active, created_at, updated_at";

const REQUIREMENT_COLUMNS: &str = "id, title, description, required_skills, preferred_skills, \
     min_years_experience, education_level, domain, is_active, created_at";

/// Lowercased, trimmed email; blank values count as absent.
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty() && e.contains('@'))
}

/// PostgreSQL implementation of CandidateRepository.
#[derive(Clone)]
pub struct PgCandidateRepository {
    pool: Pool<Postgres>,
}

impl PgCandidateRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<Candidate> {
        Ok(Candidate {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            location: row.try_get("location")?,
            current_title: row.try_get("current_title")?,
            years_of_experience: row.try_get("years_of_experience")?,
            skills: row.try_get("skills")?,
            education: row.try_get("education")?,
            summary: row.try_get("summary")?,
            experience_summary: row.try_get("experience_summary")?,
            resume_text: row.try_get("resume_text")?,
            content_hash: row.try_get("content_hash")?,
            source_filename: row.try_get("source_filename")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CandidateRepository for PgCandidateRepository {
    async fn upsert(&self, candidate: NewCandidate) -> Result<Candidate> {
        let email = normalize_email(candidate.email.as_deref());

        // Identity is the email when present, otherwise the resume content.
        let conflict_target = if email.is_some() {
            "(email) WHERE email IS NOT NULL"
        } else {
            "(content_hash) WHERE email IS NULL"
        };

        let query = format!(
            "INSERT INTO candidate (id, full_name, email, phone, location, current_title,
                                    years_of_experience, skills, education, summary,
                                    experience_summary, resume_text, content_hash,
                                    source_filename, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, TRUE, $15, $15)
             ON CONFLICT {conflict_target} DO UPDATE SET
                 full_name = EXCLUDED.full_name,
                 phone = COALESCE(EXCLUDED.phone, candidate.phone),
                 location = COALESCE(EXCLUDED.location, candidate.location),
                 current_title = COALESCE(EXCLUDED.current_title, candidate.current_title),
                 years_of_experience = COALESCE(EXCLUDED.years_of_experience,
                                                candidate.years_of_experience),
                 skills = EXCLUDED.skills,
                 education = COALESCE(EXCLUDED.education, candidate.education),
                 summary = COALESCE(EXCLUDED.summary, candidate.summary),
                 experience_summary = COALESCE(EXCLUDED.experience_summary,
                                               candidate.experience_summary),
                 resume_text = EXCLUDED.resume_text,
                 content_hash = EXCLUDED.content_hash,
                 source_filename = EXCLUDED.source_filename,
                 is_active = TRUE,
                 updated_at = EXCLUDED.updated_at
             RETURNING {CANDIDATE_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(&candidate.full_name)
            .bind(&email)
            .bind(&candidate.phone)
            .bind(&candidate.location)
            .bind(&candidate.current_title)
            .bind(candidate.years_of_experience)
            .bind(&candidate.skills)
            .bind(&candidate.education)
            .bind(&candidate.summary)
            .bind(&candidate.experience_summary)
            .bind(&candidate.resume_text)
            .bind(&candidate.content_hash)
            .bind(&candidate.source_filename)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Candidate>> {
        let query = format!("SELECT {CANDIDATE_COLUMNS} FROM candidate WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Candidate>> {
        let query = format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidate WHERE is_active ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_missing_embeddings(&self, limit: i64) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT c.id FROM candidate c
             LEFT JOIN candidate_embedding e ON e.candidate_id = c.id
             WHERE c.is_active AND e.candidate_id IS NULL
             ORDER BY c.created_at ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn list_active_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM candidate WHERE is_active ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn update_skills(&self, id: Uuid, skills: &[String]) -> Result<()> {
        let result =
            sqlx::query("UPDATE candidate SET skills = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(skills)
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("candidate {id}")));
        }
        Ok(())
    }
}

/// PostgreSQL implementation of JobRequirementRepository.
#[derive(Clone)]
pub struct PgJobRequirementRepository {
    pool: Pool<Postgres>,
}

impl PgJobRequirementRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<JobRequirement> {
        Ok(JobRequirement {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            required_skills: row.try_get("required_skills")?,
            preferred_skills: row.try_get("preferred_skills")?,
            min_years_experience: row.try_get("min_years_experience")?,
            education_level: row.try_get("education_level")?,
            domain: row.try_get("domain")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Insert a requirement row. Requirements are authored upstream; this is
    /// used by seeding and integration tests.
    pub async fn insert(&self, requirement: &JobRequirement) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_requirement (id, title, description, required_skills,
                                          preferred_skills, min_years_experience,
                                          education_level, domain, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(requirement.id)
        .bind(&requirement.title)
        .bind(&requirement.description)
        .bind(&requirement.required_skills)
        .bind(&requirement.preferred_skills)
        .bind(requirement.min_years_experience)
        .bind(&requirement.education_level)
        .bind(&requirement.domain)
        .bind(requirement.is_active)
        .bind(requirement.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl JobRequirementRepository for PgJobRequirementRepository {
    async fn get(&self, id: Uuid) -> Result<Option<JobRequirement>> {
        let query = format!("SELECT {REQUIREMENT_COLUMNS} FROM job_requirement WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email(Some("  Ada@Example.COM ")),
            Some("ada@example.com".to_string())
        );
        assert_eq!(normalize_email(Some("   ")), None);
        assert_eq!(normalize_email(Some("not available")), None);
        assert_eq!(normalize_email(None), None);
    }
}
