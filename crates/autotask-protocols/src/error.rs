//! Error types for the autotask protocol layer.

use thiserror::Error;

/// Errors surfaced by task resolution, scheduling and execution.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Invalid parameters for task '{task_type}': {message}")]
    InvalidParameters { task_type: String, message: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Task '{task_type}' timed out after {timeout_ms}ms")]
    ExecutionTimeout { task_type: String, timeout_ms: u64 },

    #[error("Task '{task_type}' failed: {message}")]
    HandlerError { task_type: String, message: String },

    #[error("Task '{task_type}' failed after {retries} retries: {last_error}")]
    ExhaustedRetries {
        task_type: String,
        retries: u32,
        last_error: String,
    },
}

impl TaskError {
    /// Whether this error came out of running the handler (as opposed to
    /// resolution, validation or scheduling). Only these are candidates for retry.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            TaskError::ExecutionTimeout { .. } | TaskError::HandlerError { .. }
        )
    }

    /// The message retry matchers are evaluated against.
    ///
    /// For handler failures this is the handler's own message, not the
    /// decorated `Display` output.
    pub fn match_message(&self) -> String {
        match self {
            TaskError::HandlerError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Error returned by a [`TaskHandler`](crate::handler::TaskHandler).
///
/// The message is what retry policies match against.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {}", err))
    }
}

/// Errors raised by a history backend.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Storage(String),

    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
