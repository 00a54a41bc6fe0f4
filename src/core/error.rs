//! Error types for pool, scheduler and queue operations.

use thiserror::Error;

/// Errors produced by Queue Service backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The named queue reached its configured depth.
    #[error("queue full: {0}")]
    Full(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced by the worker pool, the scheduler and activity adapters.
///
/// Submission-time failures (`Configuration`, `ActivityNotFound`, `NotRunning`)
/// are returned synchronously. Execution-time failures (`Execution`,
/// `AbnormalTermination`, `Callback`) never cross into the caller's stack; they
/// only show up in task results and event notifications.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A required collaborator is missing, e.g. no Queue Service at submit time.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The activity reference could not be resolved.
    #[error("activity not found: {0}")]
    ActivityNotFound(String),
    /// The pool is stopped (or was never started).
    #[error("worker pool is not running")]
    NotRunning,
    /// `start` was called while a `stop` was still in progress.
    #[error("worker pool is stopping")]
    Stopping,
    /// The activity reported an explicit error status.
    #[error("activity failed: {0}")]
    Execution(String),
    /// The activity crashed or exited without a terminal status.
    #[error("activity terminated abnormally: {0}")]
    AbnormalTermination(String),
    /// A caller-supplied completion callback failed.
    #[error("completion callback failed: {0}")]
    Callback(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Queue Service failure.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Malformed message exchanged with an activity unit.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// I/O failure talking to an activity unit.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
