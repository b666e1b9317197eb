//! Job handler contract.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hireflow_core::{Error, Job, JobType, Result};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed, as claimed.
    pub job: Job,
    /// Identifier of the worker holding the claim.
    pub worker_id: String,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job, worker_id: impl Into<String>) -> Self {
        Self {
            job,
            worker_id: worker_id.into(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }

    /// Deserialize the payload into the handler's payload type.
    ///
    /// A missing or mis-shaped payload is a permanent [`Error::InvalidInput`].
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.payload().cloned().unwrap_or(JsonValue::Null);
        serde_json::from_value(payload).map_err(|e| {
            Error::InvalidInput(format!(
                "Invalid {} payload for job {}: {}",
                self.job.job_type.as_str(),
                self.job.id,
                e
            ))
        })
    }

    /// Whether another attempt remains after this one fails transiently.
    pub fn has_retries_left(&self) -> bool {
        self.job.retry_count < self.job.max_retries
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed permanently; retrying cannot help.
    Failed(String),
    /// Job failed transiently and goes through the retry policy.
    Retry(String),
}

impl JobResult {
    /// Map an error onto the retry policy by its classification.
    pub fn from_error(error: &Error) -> Self {
        if error.is_transient() {
            JobResult::Retry(error.to_string())
        } else {
            JobResult::Failed(error.to_string())
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use hireflow_core::{JobPriority, JobStatus};

    use super::*;

    /// A claimed job as the worker would hand it to a handler.
    pub fn claimed_job(job_type: JobType, payload: JsonValue) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Processing,
            priority: JobPriority::Normal,
            payload: Some(payload),
            metadata: None,
            correlation_id: None,
            scheduled_for: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            heartbeat_at: Some(Utc::now()),
            retry_count: 0,
            max_retries: 3,
            assigned_to: Some("test-worker".to_string()),
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::claimed_job;
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Payload {
        tracker_id: Uuid,
    }

    #[test]
    fn test_parse_payload() {
        let tracker_id = Uuid::new_v4();
        let ctx = JobContext::new(
            claimed_job(JobType::ResumeProcessing, json!({ "tracker_id": tracker_id })),
            "w1",
        );
        let payload: Payload = ctx.parse_payload().unwrap();
        assert_eq!(payload.tracker_id, tracker_id);
    }

    #[test]
    fn test_parse_payload_rejects_bad_shape() {
        let ctx = JobContext::new(
            claimed_job(JobType::ResumeProcessing, json!({ "tracker_id": 7 })),
            "w1",
        );
        let err = ctx.parse_payload::<Payload>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_has_retries_left() {
        let mut job = claimed_job(JobType::BatchEmbedding, json!({}));
        job.retry_count = 2;
        assert!(JobContext::new(job.clone(), "w1").has_retries_left());
        job.retry_count = 3;
        assert!(!JobContext::new(job, "w1").has_retries_left());
    }

    #[test]
    fn test_from_error_classifies() {
        assert!(matches!(
            JobResult::from_error(&Error::Inference("timeout".into())),
            JobResult::Retry(_)
        ));
        assert!(matches!(
            JobResult::from_error(&Error::UnsupportedFormat("a.gif".into())),
            JobResult::Failed(_)
        ));
    }
}
