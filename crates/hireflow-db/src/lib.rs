//! # hireflow-db
//!
//! PostgreSQL database layer for hireflow.
//!
//! This crate provides:
//! - Connection pool management
//! - The job queue (`FOR UPDATE SKIP LOCKED` claims, heartbeats, stale sweep)
//! - Upload batch trackers for the ingestion pipeline
//! - Candidates, job requirements and the pgvector similarity index
//! - Match scores, match audits and the external profile cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use hireflow_db::{Database, JobRepository, JobType, NewJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/hireflow").await?;
//!
//!     let job_id = db.jobs.enqueue(NewJob::new(
//!         JobType::BatchEmbedding,
//!         serde_json::json!({ "candidate_ids": [] }),
//!     )).await?;
//!
//!     println!("Queued job: {}", job_id);
//!     Ok(())
//! }
//! ```

pub mod candidates;
pub mod external_profiles;
pub mod jobs;
pub mod matches;
pub mod pool;
pub mod trackers;
pub mod vectors;

// In-memory repository doubles for downstream crates' tests
#[cfg(any(test, feature = "memory"))]
pub mod memory;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use hireflow_core::*;

// Re-export repository implementations
pub use candidates::{normalize_email, PgCandidateRepository, PgJobRequirementRepository};
pub use external_profiles::PgExternalProfileRepository;
pub use jobs::PgJobRepository;
pub use matches::{PgMatchAuditRepository, PgMatchRepository};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use trackers::PgTrackerRepository;
pub use vectors::PgVectorIndex;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Job queue repository.
    pub jobs: PgJobRepository,
    /// Upload batch trackers.
    pub trackers: PgTrackerRepository,
    /// Candidates built from resumes.
    pub candidates: PgCandidateRepository,
    /// Open positions.
    pub requirements: PgJobRequirementRepository,
    /// Candidate embedding similarity index.
    pub vectors: PgVectorIndex,
    /// Candidate/requirement match scores.
    pub matches: PgMatchRepository,
    /// One row per matching run.
    pub audits: PgMatchAuditRepository,
    /// External profile cache.
    pub external_profiles: PgExternalProfileRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            trackers: PgTrackerRepository::new(pool.clone()),
            candidates: PgCandidateRepository::new(pool.clone()),
            requirements: PgJobRequirementRepository::new(pool.clone()),
            vectors: PgVectorIndex::new(pool.clone()),
            matches: PgMatchRepository::new(pool.clone()),
            audits: PgMatchAuditRepository::new(pool.clone()),
            external_profiles: PgExternalProfileRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
