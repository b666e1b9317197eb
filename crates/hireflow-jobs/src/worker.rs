//! Job worker pool for processing background jobs.
//!
//! Each process runs one [`JobWorker`] owning a bounded pool of job tasks.
//! Jobs are claimed from the shared queue in batches sized to the free pool
//! slots; the database claim is the only cross-process coordination. While a
//! handler runs, a heartbeat task keeps the claim alive so the stale sweep
//! leaves it alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use hireflow_core::{defaults, Error, Job, JobRepository, JobStatus, JobType, Result};
use hireflow_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of jobs executing at once in this process.
    pub max_concurrent_jobs: usize,
    /// Interval between heartbeats for a running job.
    pub heartbeat_interval: Duration,
    /// Identity recorded in `assigned_to` for every claimed job.
    pub worker_id: String,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            heartbeat_interval: Duration::from_secs(defaults::JOB_HEARTBEAT_INTERVAL_SECS),
            worker_id: default_worker_id(),
            enabled: true,
        }
    }
}

/// Host name, process id and a random suffix, unique across restarts.
pub fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", host, std::process::id(), &suffix[..8])
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Worker pool size |
    /// | `JOB_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `JOB_HEARTBEAT_INTERVAL_SECS` | `15` | Heartbeat interval for running jobs |
    /// | `WORKER_ID` | host-pid-random | Worker identity |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let heartbeat_secs = std::env::var("JOB_HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_HEARTBEAT_INTERVAL_SECS)
            .max(1);

        let worker_id = std::env::var("WORKER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_worker_id);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            worker_id,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the worker identity.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted { worker_id: String },
    /// A job was started.
    JobStarted { job_id: Uuid, job_type: JobType },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: JobType },
    /// A job failed terminally.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    /// A job failed transiently and went back to the queue.
    JobRequeued {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    /// The claim on a running job was lost, e.g. reclaimed by the stale sweep.
    HeartbeatLost { job_id: Uuid, job_type: JobType },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    ///
    /// The worker stops claiming and lets running jobs finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait until the worker loop has exited.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))
    }
}

type HandlerMap = Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a handler for a job type.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        self.register_shared_handler(Arc::new(handler)).await;
    }

    /// Register an already shared handler.
    pub async fn register_shared_handler(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, handler);
        debug!(job_type = job_type.as_str(), "Registered job handler");
    }

    /// Job types this worker will claim.
    pub async fn registered_types(&self) -> Vec<JobType> {
        let handlers = self.handlers.read().await;
        let mut types: Vec<JobType> = handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        let task = tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Run the worker loop.
    ///
    /// Claims as many jobs as there are free pool slots, and only sleeps when
    /// the queue came back short. A finished job frees its slot immediately.
    #[instrument(skip(self, shutdown_rx), fields(worker_id = %self.config.worker_id))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(subsystem = "jobs", component = "worker", "Job worker is disabled, not starting");
            return;
        }

        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        info!(
            subsystem = "jobs",
            component = "worker",
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent,
            heartbeat_interval_ms = self.config.heartbeat_interval.as_millis() as u64,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted {
            worker_id: self.config.worker_id.clone(),
        });

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut tasks = JoinSet::new();

        loop {
            let capacity = max_concurrent.saturating_sub(tasks.len());
            if capacity > 0 {
                for job in self.claim_jobs(capacity).await {
                    let worker = self.clone_refs();
                    tasks.spawn(async move {
                        worker.execute_job(job).await;
                    });
                }
            }

            // A short claim means the queue is drained; poll again later.
            let idle = tasks.len() < max_concurrent;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "jobs", component = "worker", "Job worker received shutdown signal");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(subsystem = "jobs", component = "worker", error = ?e, "Job task panicked");
                    }
                }
                _ = sleep(poll_interval), if idle => {}
            }
        }

        if !tasks.is_empty() {
            info!(
                subsystem = "jobs",
                component = "worker",
                running = tasks.len(),
                "Waiting for running jobs to finish"
            );
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(subsystem = "jobs", component = "worker", error = ?e, "Job task panicked");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(subsystem = "jobs", component = "worker", "Job worker stopped");
    }

    /// Claim up to `capacity` jobs of the registered types.
    async fn claim_jobs(&self, capacity: usize) -> Vec<Job> {
        let job_types = self.registered_types().await;
        if job_types.is_empty() {
            return Vec::new();
        }

        match self
            .jobs
            .claim_next_for_types(&job_types, capacity as i64, &self.config.worker_id)
            .await
        {
            Ok(jobs) => {
                if !jobs.is_empty() {
                    debug!(
                        subsystem = "jobs",
                        component = "worker",
                        op = "claim_next",
                        claimed = jobs.len(),
                        capacity,
                        "Claimed job batch"
                    );
                }
                jobs
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    op = "claim_next",
                    error = %e,
                    "Failed to claim jobs"
                );
                Vec::new()
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            worker_id: self.config.worker_id.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    jobs: Arc<dyn JobRepository>,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    worker_id: String,
    heartbeat_interval: Duration,
}

impl JobWorkerRef {
    /// Execute a single claimed job and finalize it in the queue.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;

        info!(
            subsystem = "jobs",
            component = "worker",
            %job_id,
            job_type = job_type.as_str(),
            retry_count = job.retry_count,
            correlation_id = ?job.correlation_id,
            "Processing job"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let result = match handler {
            Some(handler) => {
                let heartbeat = self.spawn_heartbeat(job_id, job_type);
                let ctx = JobContext::new(job, self.worker_id.clone());
                // Inner task so a panicking handler still gets its job finalized.
                let outcome = tokio::spawn(async move { handler.execute(ctx).await }).await;
                heartbeat.abort();
                match outcome {
                    Ok(result) => result,
                    Err(e) => {
                        error!(
                            subsystem = "jobs",
                            component = "worker",
                            %job_id,
                            job_type = job_type.as_str(),
                            error = %e,
                            "Job handler panicked"
                        );
                        JobResult::Failed(format!("Handler panicked: {}", e))
                    }
                }
            }
            None => {
                warn!(job_type = job_type.as_str(), "No handler registered for job type");
                JobResult::Failed(format!("No handler for job type: {}", job_type.as_str()))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            JobResult::Success(result_data) => {
                match self.jobs.complete(job_id, &self.worker_id, result_data).await {
                    Ok(true) => {
                        info!(
                            subsystem = "jobs",
                            component = "worker",
                            %job_id,
                            job_type = job_type.as_str(),
                            duration_ms,
                            "Job completed successfully"
                        );
                        let _ = self
                            .event_tx
                            .send(WorkerEvent::JobCompleted { job_id, job_type });
                    }
                    Ok(false) => self.claim_lost(job_id, job_type),
                    Err(e) => {
                        error!(error = %e, %job_id, "Failed to mark job as completed");
                    }
                }
            }
            JobResult::Failed(error) => {
                self.finalize_failure(job_id, job_type, error, false, duration_ms)
                    .await
            }
            JobResult::Retry(error) => {
                self.finalize_failure(job_id, job_type, error, true, duration_ms)
                    .await
            }
        }
    }

    async fn finalize_failure(
        &self,
        job_id: Uuid,
        job_type: JobType,
        error: String,
        retryable: bool,
        duration_ms: u64,
    ) {
        match self
            .jobs
            .fail(job_id, &self.worker_id, &error, retryable)
            .await
        {
            Ok(Some(JobStatus::Pending)) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    %job_id,
                    job_type = job_type.as_str(),
                    %error,
                    duration_ms,
                    "Job failed transiently, requeued"
                );
                let _ = self.event_tx.send(WorkerEvent::JobRequeued {
                    job_id,
                    job_type,
                    error,
                });
            }
            Ok(Some(_)) => {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    %job_id,
                    job_type = job_type.as_str(),
                    %error,
                    retryable,
                    duration_ms,
                    "Job failed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    job_id,
                    job_type,
                    error,
                });
            }
            Ok(None) => self.claim_lost(job_id, job_type),
            Err(e) => {
                error!(error = %e, %job_id, "Failed to mark job as failed");
            }
        }
    }

    fn claim_lost(&self, job_id: Uuid, job_type: JobType) {
        warn!(
            subsystem = "jobs",
            component = "worker",
            %job_id,
            job_type = job_type.as_str(),
            "Job is no longer held by this worker, result discarded"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::HeartbeatLost { job_id, job_type });
    }

    /// Keep the claim alive until aborted or the claim is lost.
    fn spawn_heartbeat(&self, job_id: Uuid, job_type: JobType) -> JoinHandle<()> {
        let jobs = self.jobs.clone();
        let worker_id = self.worker_id.clone();
        let event_tx = self.event_tx.clone();
        let period = self.heartbeat_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The claim itself set the first heartbeat.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match jobs.heartbeat(job_id, &worker_id).await {
                    Ok(true) => trace!(%job_id, "Heartbeat"),
                    Ok(false) => {
                        warn!(
                            subsystem = "jobs",
                            component = "worker",
                            %job_id,
                            job_type = job_type.as_str(),
                            "Heartbeat rejected, claim lost"
                        );
                        let _ = event_tx.send(WorkerEvent::HeartbeatLost { job_id, job_type });
                        break;
                    }
                    Err(e) => {
                        warn!(%job_id, error = %e, "Heartbeat failed, will retry");
                    }
                }
            }
        })
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    /// Create a new worker builder over any job queue.
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Create a builder over the PostgreSQL job queue.
    pub fn from_database(db: &Database) -> Self {
        Self::new(Arc::new(db.jobs.clone()))
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Add an already shared handler.
    pub fn with_shared_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.jobs, self.config);
        for handler in self.handlers {
            worker.register_shared_handler(handler).await;
        }
        worker
    }
}
