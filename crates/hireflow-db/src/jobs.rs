//! Job repository implementation.
//!
//! All cross-process coordination happens here. Claims and the stale sweep
//! lock rows with `FOR UPDATE SKIP LOCKED`, so concurrent workers never see
//! the same PENDING or orphaned row; every other transition is a single
//! conditional `UPDATE` fenced on the job's current status and owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hireflow_core::{
    decide_reclaim, defaults, new_v7, order_for_claim, Error, Job, JobFilter, JobPriority,
    JobRepository, JobStatus, JobType, NewJob, QueueStats, ReclaimDecision, ReclaimReport, Result,
};

/// Columns selected for every `Job` row.
const JOB_COLUMNS: &str = "id, job_type::text AS job_type, status::text AS status, priority, \
     payload, metadata, correlation_id, scheduled_for, created_at, started_at, completed_at, \
     heartbeat_at, retry_count, max_retries, assigned_to, error_message";

/// Default page size for `list_filtered`.
const DEFAULT_LIST_LIMIT: i64 = 50;

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: &PgRow) -> Result<Job> {
        let job_type: String = row.try_get("job_type")?;
        let status: String = row.try_get("status")?;
        let priority: i16 = row.try_get("priority")?;

        Ok(Job {
            id: row.try_get("id")?,
            job_type: JobType::parse(&job_type)
                .ok_or_else(|| Error::Internal(format!("unknown job type '{job_type}'")))?,
            status: JobStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("unknown job status '{status}'")))?,
            priority: JobPriority::from_i16(priority),
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            correlation_id: row.try_get("correlation_id")?,
            scheduled_for: row.try_get("scheduled_for")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            heartbeat_at: row.try_get("heartbeat_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            assigned_to: row.try_get("assigned_to")?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn parse_rows(rows: Vec<PgRow>) -> Result<Vec<Job>> {
        rows.iter().map(Self::parse_job_row).collect()
    }

    /// Explain why a conditional transition matched no row.
    async fn transition_error(&self, job_id: Uuid, attempted: &str) -> Error {
        match self.get(job_id).await {
            Ok(Some(job)) => Error::InvalidTransition(format!(
                "cannot {attempted} job {job_id} in status {} (retry {}/{})",
                job.status.as_str(),
                job.retry_count,
                job.max_retries
            )),
            Ok(None) => Error::JobNotFound(job_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(&self, job: NewJob) -> Result<Uuid> {
        if job.max_retries < 0 {
            return Err(Error::InvalidInput(format!(
                "max_retries must be non-negative, got {}",
                job.max_retries
            )));
        }

        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, job_type, status, priority, payload, metadata,
                                    correlation_id, scheduled_for, created_at, max_retries)
             VALUES ($1, $2::job_type, 'pending'::job_status, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job_id)
        .bind(job.job_type.as_str())
        .bind(job.priority.as_i16())
        .bind(&job.payload)
        .bind(&job.metadata)
        .bind(job.correlation_id)
        .bind(job.scheduled_for)
        .bind(now)
        .bind(job.max_retries)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "jobs",
            component = "queue",
            op = "enqueue",
            job_id = %job_id,
            job_type = job.job_type.as_str(),
            priority = job.priority.as_i16(),
            "Job queued"
        );
        Ok(job_id)
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
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| jt.as_str().to_string())
            .collect();

        // Rows locked by a concurrent claimer are skipped rather than waited
        // on, so each claimer gets a disjoint set.
        let query = format!(
            "UPDATE job_queue
             SET status = 'processing'::job_status, started_at = $1, heartbeat_at = $1,
                 assigned_to = $2
             WHERE id IN (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                   AND job_type::text = ANY($3)
                   AND (scheduled_for IS NULL OR scheduled_for <= $1)
                 ORDER BY priority DESC, created_at ASC
                 LIMIT $4
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );

        let rows = sqlx::query(&query)
            .bind(now)
            .bind(worker_id)
            .bind(&type_strings)
            .bind(batch_size)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        // RETURNING carries no ordering guarantee.
        let mut jobs = Self::parse_rows(rows)?;
        order_for_claim(&mut jobs);

        if !jobs.is_empty() {
            debug!(
                subsystem = "jobs",
                component = "queue",
                op = "claim_next",
                worker_id = worker_id,
                result_count = jobs.len(),
                "Claimed jobs"
            );
        }
        Ok(jobs)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job_queue SET heartbeat_at = $1
             WHERE id = $2 AND status = 'processing'::job_status AND assigned_to = $3",
        )
        .bind(Utc::now())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: Option<JsonValue>,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE job_queue
             SET status = 'completed'::job_status, completed_at = $1,
                 metadata = CASE WHEN $2::jsonb IS NULL THEN metadata
                                 ELSE COALESCE(metadata, '{}'::jsonb)
                                      || jsonb_build_object('result', $2::jsonb) END
             WHERE id = $3 AND status = 'processing'::job_status AND assigned_to = $4",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobStatus>> {
        // One conditional UPDATE: after waiting on a row lock held by the
        // stale sweep, Postgres re-evaluates the owner fence against the new
        // row version, so a requeued job is left alone. SET expressions see
        // the pre-update retry count.
        let row = sqlx::query(
            "UPDATE job_queue
             SET status = CASE WHEN $3 AND retry_count < max_retries THEN 'pending'::job_status
                               ELSE 'failed'::job_status END,
                 retry_count = CASE WHEN $3 THEN retry_count + 1 ELSE retry_count END,
                 error_message = $4,
                 assigned_to = CASE WHEN $3 AND retry_count < max_retries THEN NULL
                                    ELSE assigned_to END,
                 heartbeat_at = CASE WHEN $3 AND retry_count < max_retries THEN NULL
                                     ELSE heartbeat_at END,
                 started_at = CASE WHEN $3 AND retry_count < max_retries THEN NULL
                                   ELSE started_at END,
                 completed_at = CASE WHEN $3 AND retry_count < max_retries THEN NULL
                                     ELSE $5 END
             WHERE id = $1 AND status = 'processing'::job_status AND assigned_to = $2
             RETURNING status::text AS status",
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(retryable)
        .bind(error)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        JobStatus::parse(&status)
            .map(Some)
            .ok_or_else(|| Error::Internal(format!("unknown job status '{status}'")))
    }

    async fn retry(&self, job_id: Uuid) -> Result<Job> {
        let query = format!(
            "UPDATE job_queue
             SET status = 'pending'::job_status, retry_count = retry_count + 1,
                 assigned_to = NULL, heartbeat_at = NULL, started_at = NULL, completed_at = NULL
             WHERE id = $1 AND status = 'failed'::job_status AND retry_count < max_retries
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_job_row(&row),
            None => Err(self.transition_error(job_id, "retry").await),
        }
    }

    async fn cancel(&self, job_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job_queue SET status = 'cancelled'::job_status, completed_at = $1
             WHERE id = $2 AND status = 'pending'::job_status",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(self.transition_error(job_id, "cancel").await)
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn list_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM job_queue WHERE correlation_id = $1
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(correlation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_rows(rows)
    }

    async fn list_filtered(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        if filter.status.is_some() {
            conditions.push(format!("status::text = ${}", param_idx));
            param_idx += 1;
        }
        if filter.job_type.is_some() {
            conditions.push(format!("job_type::text = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {JOB_COLUMNS}
             FROM job_queue
             {}
             ORDER BY created_at DESC
             LIMIT ${} OFFSET ${}",
            where_clause,
            param_idx,
            param_idx + 1
        );

        let limit = if filter.limit > 0 {
            filter.limit
        } else {
            DEFAULT_LIST_LIMIT
        };

        let mut q = sqlx::query(&query);
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        if let Some(job_type) = filter.job_type {
            q = q.bind(job_type.as_str());
        }
        q = q.bind(limit).bind(filter.offset.max(0));

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        Self::parse_rows(rows)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') AS completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') AS failed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND retry_count >= max_retries) AS dead_lettered,
                COUNT(*) AS total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.try_get("pending")?,
            processing: row.try_get("processing")?,
            completed_last_hour: row.try_get("completed_last_hour")?,
            failed_last_hour: row.try_get("failed_last_hour")?,
            dead_lettered: row.try_get("dead_lettered")?,
            total: row.try_get("total")?,
        })
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>) -> Result<ReclaimReport> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Lock the orphaned rows; a concurrent sweeper skips them.
        let select = format!(
            "SELECT {JOB_COLUMNS} FROM job_queue
             WHERE status = 'processing'::job_status AND heartbeat_at < $1
             ORDER BY heartbeat_at ASC
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&select)
            .bind(stale_before)
            .fetch_all(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let stale = Self::parse_rows(rows)?;

        if stale.is_empty() {
            tx.commit().await.map_err(Error::Database)?;
            return Ok(ReclaimReport::default());
        }

        let (requeue, dead_letter): (Vec<&Job>, Vec<&Job>) = stale
            .iter()
            .partition(|job| decide_reclaim(job.retry_count, job.max_retries) == ReclaimDecision::Requeue);
        let requeue_ids: Vec<Uuid> = requeue.iter().map(|job| job.id).collect();
        let dead_letter_ids: Vec<Uuid> = dead_letter.iter().map(|job| job.id).collect();

        for job in &stale {
            warn!(
                subsystem = "jobs",
                component = "reclaimer",
                op = "reclaim_stale",
                job_id = %job.id,
                job_type = job.job_type.as_str(),
                worker_id = job.assigned_to.as_deref().unwrap_or("unknown"),
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                "Job heartbeat is stale"
            );
        }

        let mut report = ReclaimReport::default();

        if !requeue_ids.is_empty() {
            let result = sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending'::job_status, retry_count = retry_count + 1,
                     assigned_to = NULL, heartbeat_at = NULL, started_at = NULL
                 WHERE id = ANY($1) AND status = 'processing'::job_status",
            )
            .bind(&requeue_ids)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            debug!(
                subsystem = "jobs",
                component = "reclaimer",
                result_count = result.rows_affected(),
                "Requeued stale jobs"
            );
            report.requeued = requeue_ids;
        }

        if !dead_letter_ids.is_empty() {
            let update = format!(
                "UPDATE job_queue
                 SET status = 'failed'::job_status, retry_count = retry_count + 1,
                     error_message = $1, completed_at = $2
                 WHERE id = ANY($3) AND status = 'processing'::job_status
                 RETURNING {JOB_COLUMNS}"
            );
            let rows = sqlx::query(&update)
                .bind(defaults::RETRIES_EXHAUSTED_MESSAGE)
                .bind(Utc::now())
                .bind(&dead_letter_ids)
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::Database)?;
            report.dead_lettered = Self::parse_rows(rows)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "jobs",
            component = "reclaimer",
            op = "reclaim_stale",
            requeued = report.requeued.len(),
            dead_lettered = report.dead_lettered.len(),
            "Stale sweep reclaimed jobs"
        );
        Ok(report)
    }

    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM job_queue
             WHERE status IN ('completed'::job_status, 'cancelled'::job_status)
               AND completed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
