//! Stale-job reclaimer and retention purge.
//!
//! A crashed worker is noticed only through its heartbeats going stale. The
//! reclaimer periodically requeues such jobs, or dead-letters them once their
//! retries are used up, and deletes finished jobs past the retention window.
//! Any number of processes may run it: the sweep itself is one atomic query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use hireflow_core::{defaults, Error, Job, JobRepository, Result};

/// Configuration for the stale sweep.
#[derive(Debug, Clone)]
pub struct ReclaimerConfig {
    /// Heartbeat age after which a PROCESSING job counts as orphaned.
    pub stale_threshold_secs: u64,
    /// Interval between sweeps.
    pub sweep_interval_secs: u64,
    /// Age after which COMPLETED and CANCELLED jobs are deleted.
    pub retention_hours: u64,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: defaults::JOB_STALE_THRESHOLD_SECS,
            sweep_interval_secs: defaults::JOB_SWEEP_INTERVAL_SECS,
            retention_hours: defaults::JOB_RETENTION_HOURS,
        }
    }
}

impl ReclaimerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `JOB_STALE_THRESHOLD_SECS` | `120` |
    /// | `JOB_SWEEP_INTERVAL_SECS` | `30` |
    /// | `JOB_RETENTION_HOURS` | `168` |
    pub fn from_env() -> Self {
        let read = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            stale_threshold_secs: read(
                "JOB_STALE_THRESHOLD_SECS",
                defaults::JOB_STALE_THRESHOLD_SECS,
            )
            .max(1),
            sweep_interval_secs: read("JOB_SWEEP_INTERVAL_SECS", defaults::JOB_SWEEP_INTERVAL_SECS)
                .max(1),
            retention_hours: read("JOB_RETENTION_HOURS", defaults::JOB_RETENTION_HOURS),
        }
    }

    pub fn with_stale_threshold_secs(mut self, secs: u64) -> Self {
        self.stale_threshold_secs = secs;
        self
    }

    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs.max(1);
        self
    }

    pub fn with_retention_hours(mut self, hours: u64) -> Self {
        self.retention_hours = hours;
        self
    }
}

/// Called for every job the sweep dead-letters.
#[async_trait]
pub trait DeadLetterHook: Send + Sync {
    async fn on_dead_letter(&self, job: &Job) -> Result<()>;

    /// Catch up on dead-letters whose `on_dead_letter` failed or never ran.
    /// Called once per sweep; returns how many were repaired.
    async fn reconcile(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub requeued: usize,
    pub dead_lettered: usize,
    /// Dead-letters picked up by hook reconciliation.
    pub reconciled: usize,
    pub purged: u64,
}

pub struct StaleJobReclaimer {
    jobs: Arc<dyn JobRepository>,
    config: ReclaimerConfig,
    hooks: Vec<Arc<dyn DeadLetterHook>>,
}

impl StaleJobReclaimer {
    pub fn new(jobs: Arc<dyn JobRepository>, config: ReclaimerConfig) -> Self {
        Self {
            jobs,
            config,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn DeadLetterHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run one sweep: reclaim stale jobs, notify hooks, let hooks reconcile,
    /// purge old jobs.
    ///
    /// A failing hook is logged and does not stop the sweep; its work is
    /// picked up by `reconcile` on a later sweep.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "reclaimer"))]
    pub async fn sweep_once(&self) -> Result<SweepOutcome> {
        let now = Utc::now();
        let stale_before = now - secs_to_chrono(self.config.stale_threshold_secs)?;
        let report = self.jobs.reclaim_stale(stale_before).await?;

        for job_id in &report.requeued {
            warn!(
                op = "reclaim_stale",
                %job_id,
                "Requeued job with stale heartbeat"
            );
        }
        for job in &report.dead_lettered {
            error!(
                op = "reclaim_stale",
                job_id = %job.id,
                job_type = job.job_type.as_str(),
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                "Dead-lettered job with stale heartbeat"
            );
            for hook in &self.hooks {
                if let Err(e) = hook.on_dead_letter(job).await {
                    error!(job_id = %job.id, error = %e, "Dead-letter hook failed");
                }
            }
        }

        let mut reconciled = 0;
        for hook in &self.hooks {
            match hook.reconcile().await {
                Ok(n) => reconciled += n,
                Err(e) => error!(op = "reconcile", error = %e, "Dead-letter reconcile failed"),
            }
        }

        let retention = secs_to_chrono(self.config.retention_hours.saturating_mul(3600))?;
        let purged = self.jobs.purge_finished(now - retention).await?;

        let outcome = SweepOutcome {
            requeued: report.requeued.len(),
            dead_lettered: report.dead_lettered.len(),
            reconciled,
            purged,
        };
        if outcome != SweepOutcome::default() {
            info!(
                op = "sweep",
                requeued = outcome.requeued,
                dead_lettered = outcome.dead_lettered,
                reconciled = outcome.reconciled,
                purged = outcome.purged,
                "Stale sweep finished"
            );
        }
        Ok(outcome)
    }

    /// Sweep on a fixed interval until shut down. The first sweep runs at once.
    pub fn start(self) -> ReclaimerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));

        let task = tokio::spawn(async move {
            info!(
                subsystem = "jobs",
                component = "reclaimer",
                stale_threshold_secs = self.config.stale_threshold_secs,
                sweep_interval_secs = self.config.sweep_interval_secs,
                retention_hours = self.config.retention_hours,
                "Stale job reclaimer started"
            );
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(subsystem = "jobs", component = "reclaimer", error = %e, "Stale sweep failed");
                        }
                    }
                }
            }
            info!(subsystem = "jobs", component = "reclaimer", "Stale job reclaimer stopped");
        });

        ReclaimerHandle { shutdown_tx, task }
    }
}

fn secs_to_chrono(secs: u64) -> Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| Error::Config(format!("Duration out of range: {}s", secs)))
}

/// Handle for stopping a running reclaimer.
pub struct ReclaimerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReclaimerHandle {
    /// Stop sweeping and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Reclaimer task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaimer_config_default() {
        let config = ReclaimerConfig::default();
        assert_eq!(config.stale_threshold_secs, 120);
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.retention_hours, 168);
    }

    #[test]
    fn test_reclaimer_config_builder() {
        let config = ReclaimerConfig::default()
            .with_stale_threshold_secs(5)
            .with_sweep_interval_secs(0)
            .with_retention_hours(1);
        assert_eq!(config.stale_threshold_secs, 5);
        assert_eq!(config.sweep_interval_secs, 1);
        assert_eq!(config.retention_hours, 1);
    }

    #[test]
    fn test_secs_to_chrono() {
        assert_eq!(secs_to_chrono(90).unwrap(), chrono::Duration::seconds(90));
        assert!(secs_to_chrono(u64::MAX).is_err());
    }
}
