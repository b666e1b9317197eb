//! Error types for hireflow.

use thiserror::Error;

/// Result type alias using hireflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hireflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Process tracker not found
    #[error("Tracker not found: {0}")]
    TrackerNotFound(uuid::Uuid),

    /// A state change that the entity's lifecycle does not allow
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// External profile enrichment failed
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uploaded file cannot be processed in its format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure may succeed on a later attempt.
    ///
    /// Infrastructure failures (database, network, model endpoints) are
    /// transient and go through the job retry policy. Validation failures are
    /// permanent and fail the job immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Embedding(_)
                | Error::Inference(_)
                | Error::Enrichment(_)
                | Error::Request(_)
                | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
