//! Worker pool tests against the in-memory job queue.
//!
//! This test suite validates:
//! - Claimed jobs are executed and completed with their result
//! - Transient failures are requeued until retries run out
//! - Permanent failures and panics fail the job without retrying
//! - The pool never runs more jobs at once than its size
//! - Heartbeats keep running jobs fresh
//! - Shutdown lets running jobs finish

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hireflow_db::memory::MemoryJobQueue;
use hireflow_jobs::{
    Job, JobContext, JobHandler, JobRepository, JobResult, JobStatus, JobType, NewJob,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(10)
        .with_max_concurrent(2)
        .with_heartbeat_interval(Duration::from_millis(20))
        .with_worker_id("test-worker")
}

/// Wait until `check` holds for the job or the timeout passes.
async fn wait_for_job<F>(queue: &MemoryJobQueue, job_id: Uuid, check: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    for _ in 0..500 {
        if let Some(job) = queue.get(job_id).await.unwrap() {
            if check(&job) {
                return job;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached the expected state");
}

/// Handler that returns a fixed outcome and counts executions.
struct ScriptedHandler {
    job_type: JobType,
    outcome: fn() -> JobResult,
    runs: Arc<AtomicUsize>,
}

impl ScriptedHandler {
    fn new(job_type: JobType, outcome: fn() -> JobResult) -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            Self {
                job_type,
                outcome,
                runs: runs.clone(),
            },
            runs,
        )
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

#[tokio::test]
async fn test_worker_completes_job_with_result() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
        .await
        .unwrap();

    let (handler, runs) = ScriptedHandler::new(JobType::BatchEmbedding, || {
        JobResult::Success(Some(json!({ "embedded": 3 })))
    });
    let worker = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job = wait_for_job(&queue, job_id, |j| j.status == JobStatus::Completed).await;
    assert_eq!(job.metadata.unwrap()["result"]["embedded"], 3);
    assert_eq!(job.assigned_to.as_deref(), Some("test-worker"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::JobCompleted { job_id: id, .. } = event {
            saw_completed |= id == job_id;
        }
    }
    assert!(saw_completed);

    handle.shutdown().await.unwrap();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_transient_failure_retries_then_fails() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})).with_max_retries(2))
        .await
        .unwrap();

    let (handler, runs) = ScriptedHandler::new(JobType::BatchEmbedding, || {
        JobResult::Retry("embedding endpoint returned 502".to_string())
    });
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .await
        .start();

    let job = wait_for_job(&queue, job_id, |j| j.status == JobStatus::Failed).await;
    // Three attempts: two requeues, then the retry budget is exhausted.
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(job.retry_count, 3);
    assert!(job.is_dead_lettered());
    assert_eq!(
        job.error_message.as_deref(),
        Some("embedding endpoint returned 502")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::ResumeProcessing, json!({})))
        .await
        .unwrap();

    let (handler, runs) = ScriptedHandler::new(JobType::ResumeProcessing, || {
        JobResult::Failed("Unsupported format: photo.png".to_string())
    });
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .await
        .start();

    let job = wait_for_job(&queue, job_id, |j| j.status == JobStatus::Failed).await;
    assert_eq!(job.retry_count, 0);
    assert!(!job.is_dead_lettered());
    sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // An operator can still push it back explicitly.
    let retried = queue.retry(job_id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);

    handle.shutdown().await.unwrap();
}

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    fn job_type(&self) -> JobType {
        JobType::DataMigration
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        panic!("handler bug");
    }
}

#[tokio::test]
async fn test_panicking_handler_fails_job_and_worker_survives() {
    let queue = Arc::new(MemoryJobQueue::new());
    let first = queue
        .enqueue(NewJob::new(JobType::DataMigration, json!({})))
        .await
        .unwrap();
    let second = queue
        .enqueue(NewJob::new(JobType::DataMigration, json!({})))
        .await
        .unwrap();

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_max_concurrent(1))
        .with_handler(PanickingHandler)
        .build()
        .await
        .start();

    for job_id in [first, second] {
        let job = wait_for_job(&queue, job_id, |j| j.status == JobStatus::Failed).await;
        assert!(job
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("panicked"));
    }

    handle.shutdown().await.unwrap();
}

/// Sleeps for a while and records peak concurrency.
struct SlowHandler {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl JobHandler for SlowHandler {
    fn job_type(&self) -> JobType {
        JobType::BatchEmbedding
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        JobResult::Success(None)
    }
}

#[tokio::test]
async fn test_pool_size_bounds_concurrency() {
    let queue = Arc::new(MemoryJobQueue::new());
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(
            queue
                .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
                .await
                .unwrap(),
        );
    }

    let peak = Arc::new(AtomicUsize::new(0));
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_max_concurrent(2))
        .with_handler(SlowHandler {
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
            delay: Duration::from_millis(30),
        })
        .build()
        .await
        .start();

    for id in ids {
        wait_for_job(&queue, id, |j| j.status == JobStatus::Completed).await;
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_refreshes_running_job() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
        .await
        .unwrap();

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(SlowHandler {
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(300),
        })
        .build()
        .await
        .start();

    let claimed = wait_for_job(&queue, job_id, |j| j.status == JobStatus::Processing).await;
    let first_beat = claimed.heartbeat_at.unwrap();
    let refreshed = wait_for_job(&queue, job_id, |j| {
        j.status == JobStatus::Processing && j.heartbeat_at.map_or(false, |t| t > first_beat)
    })
    .await;
    assert!(refreshed.heartbeat_at.unwrap() > first_beat);

    wait_for_job(&queue, job_id, |j| j.status == JobStatus::Completed).await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_running_jobs() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
        .await
        .unwrap();

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(SlowHandler {
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(100),
        })
        .build()
        .await
        .start();
    let mut events = handle.events();

    wait_for_job(&queue, job_id, |j| j.status == JobStatus::Processing).await;
    handle.shutdown().await.unwrap();
    handle.join().await.unwrap();

    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        stopped |= matches!(event, WorkerEvent::WorkerStopped);
    }
    assert!(stopped);
}

#[tokio::test]
async fn test_disabled_worker_claims_nothing() {
    let queue = Arc::new(MemoryJobQueue::new());
    let job_id = queue
        .enqueue(NewJob::new(JobType::BatchEmbedding, json!({})))
        .await
        .unwrap();

    let (handler, runs) =
        ScriptedHandler::new(JobType::BatchEmbedding, || JobResult::Success(None));
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_enabled(false))
        .with_handler(handler)
        .build()
        .await
        .start();
    handle.join().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}
