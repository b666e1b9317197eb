//! Upload batch tracker repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use hireflow_core::{
    new_v7, Error, FileOutcome, IngestionStatus, ProcessTracker, Result, TrackerRepository,
};

const TRACKER_COLUMNS: &str = "id, uploaded_filename, total_files, processed_files, \
     failed_files, status, message, created_at, completed_at";

/// PostgreSQL implementation of TrackerRepository.
#[derive(Clone)]
pub struct PgTrackerRepository {
    pool: Pool<Postgres>,
}

impl PgTrackerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<ProcessTracker> {
        let status: String = row.try_get("status")?;
        Ok(ProcessTracker {
            id: row.try_get("id")?,
            uploaded_filename: row.try_get("uploaded_filename")?,
            total_files: row.try_get("total_files")?,
            processed_files: row.try_get("processed_files")?,
            failed_files: row.try_get("failed_files")?,
            status: IngestionStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("unknown tracker status '{status}'")))?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM process_tracker WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TrackerRepository for PgTrackerRepository {
    async fn create(&self, uploaded_filename: &str, total_files: i32) -> Result<ProcessTracker> {
        if total_files <= 0 {
            return Err(Error::InvalidInput(format!(
                "upload '{uploaded_filename}' contains no files"
            )));
        }

        let query = format!(
            "INSERT INTO process_tracker (id, uploaded_filename, total_files, status, created_at)
             VALUES ($1, $2, $3, 'initiated', $4)
             RETURNING {TRACKER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(uploaded_filename)
            .bind(total_files)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProcessTracker>> {
        let query = format!("SELECT {TRACKER_COLUMNS} FROM process_tracker WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessTracker>> {
        let query = format!(
            "SELECT {TRACKER_COLUMNS} FROM process_tracker ORDER BY created_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<ProcessTracker>> {
        let query = format!(
            "SELECT {TRACKER_COLUMNS} FROM process_tracker
             WHERE status NOT IN ('completed', 'failed')
             ORDER BY created_at LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn advance_stage(&self, id: Uuid, stage: IngestionStatus) -> Result<bool> {
        if stage.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "{} is reached through file outcomes, not advance_stage",
                stage.as_str()
            )));
        }

        let stages: Vec<String> = IngestionStatus::STAGES
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let result = sqlx::query(
            "UPDATE process_tracker SET status = $2
             WHERE id = $1
               AND status NOT IN ('completed', 'failed')
               AND array_position($3::text[], status) < array_position($3::text[], $2)",
        )
        .bind(id)
        .bind(stage.as_str())
        .bind(&stages)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(Error::TrackerNotFound(id));
        }
        Ok(false)
    }

    async fn record_file_outcome(
        &self,
        id: Uuid,
        job_id: Uuid,
        outcome: FileOutcome,
    ) -> Result<Option<ProcessTracker>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Row lock serializes sibling files of the same batch.
        let select = format!("SELECT {TRACKER_COLUMNS} FROM process_tracker WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::TrackerNotFound(id))?;
        let mut tracker = Self::parse_row(&row)?;
        let now = Utc::now();

        if tracker.status.is_terminal() || tracker.all_files_resolved() {
            tx.commit().await.map_err(Error::Database)?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            "INSERT INTO process_tracker_file (tracker_id, job_id, outcome, reason, recorded_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tracker_id, job_id) DO NOTHING",
        )
        .bind(id)
        .bind(job_id)
        .bind(outcome.as_str())
        .bind(outcome.reason())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if inserted.rows_affected() == 0 {
            tx.commit().await.map_err(Error::Database)?;
            debug!(
                subsystem = "ingestion",
                component = "tracker",
                tracker_id = %id,
                %job_id,
                "File outcome already recorded for job"
            );
            return Ok(None);
        }

        if !tracker.apply_outcome(&outcome, now) {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE process_tracker
             SET processed_files = $2, failed_files = $3, status = $4, message = $5,
                 completed_at = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(tracker.processed_files)
        .bind(tracker.failed_files)
        .bind(tracker.status.as_str())
        .bind(&tracker.message)
        .bind(tracker.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        if tracker.status.is_terminal() {
            info!(
                subsystem = "ingestion",
                component = "tracker",
                op = "finalize",
                tracker_id = %id,
                status = tracker.status.as_str(),
                processed_files = tracker.processed_files,
                failed_files = tracker.failed_files,
                total_files = tracker.total_files,
                "Upload batch finished"
            );
        }
        Ok(Some(tracker))
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE process_tracker SET status = 'failed', message = $2, completed_at = $3
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(Error::TrackerNotFound(id));
        }
        Ok(false)
    }
}
