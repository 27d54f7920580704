//! Error types for the executor.

use thiserror::Error;

use flowboard_queue::QueueError;

/// Errors that can occur in the executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Executor is not in a state that accepts this operation.
    #[error("Executor is not running")]
    NotRunning,

    /// Startup failed (recovery or loop initialization).
    #[error("Startup failed: {0}")]
    StartupFailed(String),

    /// The execution capability reported a failure.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The execution capability exceeded the configured timeout.
    #[error("Execution timed out after {0}ms")]
    ExecutionTimeout(u64),

    /// Queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;
