//! Error types for gpusched

use crate::JobId;
use thiserror::Error;

/// Main error type for gpusched
#[derive(Error, Debug)]
pub enum GpuschedError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error (spawning or polling a child process)
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Submission rejected because the scheduler daemon is not running
    #[error("Scheduler daemon is not running")]
    DaemonNotRunning,

    /// The scheduler daemon is already running
    #[error("Scheduler daemon is already running")]
    DaemonAlreadyRunning,

    /// Submission rejected because the pending queue is full
    #[error("Pending queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Job submission failed validation
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gpusched operations
pub type GpuschedResult<T> = Result<T, GpuschedError>;

impl From<serde_json::Error> for GpuschedError {
    fn from(err: serde_json::Error) -> Self {
        GpuschedError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuschedError {
    fn from(err: toml::de::Error) -> Self {
        GpuschedError::Config(err.to_string())
    }
}
