//! Retry state for one execution chain.

use std::time::Duration;

use autotask_protocols::{RetryPolicy, TaskError};

/// Execution ID used for retry number `retry_count` of `original`.
pub fn retry_execution_id(original: &str, retry_count: u32) -> String {
    format!("{}-retry-{}", original, retry_count)
}

/// Whether `error` should start or continue a retry chain under `policy`.
///
/// Only failures from running the handler qualify; resolution and validation
/// errors never do, whatever the matchers say.
pub fn should_retry(policy: &RetryPolicy, error: &TaskError) -> bool {
    error.is_execution_failure() && policy.is_retryable(&error.match_message())
}

/// Progress of a retry chain.
///
/// Created after the first failed attempt and dropped when the chain ends.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts_remaining: u32,
    pub retry_count: u32,
    pub last_error: TaskError,
    pub original_execution_id: String,
}

impl RetryState {
    /// Start a chain after `first_error`.
    pub fn new(
        policy: &RetryPolicy,
        original_execution_id: impl Into<String>,
        first_error: TaskError,
    ) -> Self {
        Self {
            attempts_remaining: policy.max_retries,
            retry_count: 0,
            last_error: first_error,
            original_execution_id: original_execution_id.into(),
        }
    }

    /// Consume one attempt and return the delay to wait before it, or `None`
    /// once the budget is spent.
    pub fn next_retry(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        if self.attempts_remaining == 0 {
            return None;
        }
        self.attempts_remaining -= 1;
        self.retry_count += 1;
        Some(policy.delay_for_retry(self.retry_count))
    }

    /// Execution ID for the current retry.
    pub fn retry_execution_id(&self) -> String {
        retry_execution_id(&self.original_execution_id, self.retry_count)
    }

    pub fn record_failure(&mut self, error: TaskError) {
        self.last_error = error;
    }

    /// Terminal error once no attempts remain.
    pub fn into_exhausted(self, task_type: &str) -> TaskError {
        TaskError::ExhaustedRetries {
            task_type: task_type.to_string(),
            retries: self.retry_count,
            last_error: self.last_error.match_message(),
        }
    }
}
