//! PostgreSQL connection pool for worker processes.
//!
//! A worker process holds one connection per running job for result writes,
//! one for its heartbeat ticks and one for the claim loop; the reclaimer
//! borrows one more per sweep. [`PoolConfig::for_worker`] sizes the pool
//! from the job concurrency so claims never starve behind handlers.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use hireflow_core::{defaults, Error, Result};

/// Connections reserved beyond the per-job ones: claim loop, heartbeat
/// ticker and reclaimer sweep.
pub const RESERVED_CONNECTIONS: u32 = 3;

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_worker(defaults::JOB_MAX_CONCURRENT)
    }
}

impl PoolConfig {
    /// Pool large enough for `max_concurrent_jobs` running handlers.
    pub fn for_worker(max_concurrent_jobs: usize) -> Self {
        let jobs = u32::try_from(max_concurrent_jobs.max(1)).unwrap_or(u32::MAX);
        Self {
            max_connections: jobs.saturating_add(RESERVED_CONNECTIONS),
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DB_MAX_CONNECTIONS` | `JOB_MAX_CONCURRENT` + 3 | Pool ceiling |
    /// | `DB_MIN_CONNECTIONS` | `1` | Connections kept open |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    pub fn from_env() -> Self {
        let jobs = env_parse::<usize>("JOB_MAX_CONCURRENT").unwrap_or(defaults::JOB_MAX_CONCURRENT);
        let mut config = Self::for_worker(jobs);
        if let Some(n) = env_parse::<u32>("DB_MAX_CONNECTIONS") {
            config.max_connections = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("DB_MIN_CONNECTIONS") {
            config.min_connections = n;
        }
        if let Some(secs) = env_parse::<u64>("DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs.max(1));
        }
        config.min_connections = config.min_connections.min(config.max_connections);
        config
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Connect with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect with an explicit configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}
