//! Execution engine.
//!
//! Resolves a task, validates and merges its parameters, and runs the handler
//! under a deadline. Failed attempts are retried according to the task's
//! retry policy. The engine writes no history; that is the caller's job.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, info, warn};

use autotask_core::TaskRegistry;
use autotask_protocols::{HandlerContext, TaskDefinition, TaskError};

use crate::retry::{RetryState, should_retry};

/// A resolved task with its final parameters, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedExecution {
    pub definition: Arc<TaskDefinition>,
    /// Defaults merged under the explicit parameters.
    pub parameters: Value,
}

impl PreparedExecution {
    pub fn task_type(&self) -> &str {
        &self.definition.task_type
    }
}

/// Runs task handlers with timeout and retry.
pub struct ExecutionEngine {
    registry: Arc<TaskRegistry>,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Resolve, validate and merge. Nothing runs yet.
    ///
    /// Validation applies to the explicit parameters only; defaults are merged
    /// afterwards with explicit values taking precedence.
    pub fn prepare(&self, task_type: &str, parameters: Value) -> Result<PreparedExecution, TaskError> {
        let definition = self.registry.lookup(task_type)?;

        let explicit = match parameters {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(TaskError::InvalidParameters {
                    task_type: task_type.to_string(),
                    message: format!("parameters must be an object, got {}", other),
                });
            }
        };

        if let Some(schema) = &definition.parameters_schema {
            let instance = Value::Object(explicit.clone());
            schema
                .validate(&instance)
                .map_err(|message| TaskError::InvalidParameters {
                    task_type: task_type.to_string(),
                    message,
                })?;
        }

        let mut merged = definition.default_parameters.clone();
        merged.extend(explicit);

        Ok(PreparedExecution {
            definition,
            parameters: Value::Object(merged),
        })
    }

    /// Run a prepared execution, retrying as the policy allows.
    pub async fn run(&self, prepared: &PreparedExecution, execution_id: &str) -> Result<Value, TaskError> {
        let definition = &prepared.definition;

        let first_error =
            match Self::attempt(definition, prepared.parameters.clone(), execution_id, 0).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

        let policy = match &definition.retry_policy {
            Some(policy) if should_retry(policy, &first_error) => policy,
            _ => return Err(first_error),
        };

        let mut state = RetryState::new(policy, execution_id, first_error);

        while let Some(delay) = state.next_retry(policy) {
            warn!(
                task_type = %definition.task_type,
                execution_id = %execution_id,
                retry = state.retry_count,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %state.last_error,
                "Task failed, retrying"
            );
            sleep(delay).await;

            let retry_id = state.retry_execution_id();
            match Self::attempt(definition, prepared.parameters.clone(), &retry_id, state.retry_count)
                .await
            {
                Ok(result) => {
                    info!(
                        task_type = %definition.task_type,
                        execution_id = %execution_id,
                        retry = state.retry_count,
                        "Task succeeded on retry"
                    );
                    return Ok(result);
                }
                Err(e) if should_retry(policy, &e) => state.record_failure(e),
                Err(e) => return Err(e),
            }
        }

        Err(state.into_exhausted(&definition.task_type))
    }

    /// `prepare` followed by `run`.
    pub async fn execute(
        &self,
        task_type: &str,
        parameters: Value,
        execution_id: &str,
    ) -> Result<Value, TaskError> {
        let prepared = self.prepare(task_type, parameters)?;
        self.run(&prepared, execution_id).await
    }

    /// One handler invocation raced against the task's deadline.
    ///
    /// The handler runs as its own tokio task. If the deadline wins, the join
    /// handle is dropped and the handler keeps running detached; whatever it
    /// returns later is discarded.
    async fn attempt(
        definition: &TaskDefinition,
        parameters: Value,
        execution_id: &str,
        attempt: u32,
    ) -> Result<Value, TaskError> {
        let ctx = HandlerContext::new(&definition.task_type, execution_id, attempt);
        let span = ctx.span.clone();
        let handler = definition.handler.clone();

        debug!(parent: &span, "Invoking handler");
        let handle = tokio::spawn(async move { handler.handle(parameters, ctx).await }.instrument(span));

        match timeout(Duration::from_millis(definition.timeout_ms), handle).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(TaskError::HandlerError {
                task_type: definition.task_type.clone(),
                message: e.message,
            }),
            Ok(Err(join_error)) => Err(TaskError::HandlerError {
                task_type: definition.task_type.clone(),
                message: format!("handler panicked: {}", join_error),
            }),
            Err(_) => Err(TaskError::ExecutionTimeout {
                task_type: definition.task_type.clone(),
                timeout_ms: definition.timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
