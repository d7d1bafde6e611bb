//! Wiring configuration into a running scheduler.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use autotask_config::{Config, EngineConfig, RetryConfig, TaskConfig};
use autotask_core::TaskRegistry;
use autotask_protocols::{ErrorMatcher, ParameterSchema, RetryPolicy, TaskDefinition};
use autotask_runtime::{ExecutionEngine, MemoryHistoryStore};
use autotask_scheduler::Scheduler;

use crate::handlers::{BUILTIN_HANDLERS, builtin_handler};

/// Turn one `[[tasks]]` entry into a definition.
pub fn task_definition(task: &TaskConfig, engine: &EngineConfig) -> Result<TaskDefinition> {
    let handler = builtin_handler(&task.handler).ok_or_else(|| {
        anyhow!(
            "unknown handler '{}' for task '{}' (available: {})",
            task.handler,
            task.task_type,
            BUILTIN_HANDLERS.join(", ")
        )
    })?;

    let mut definition = TaskDefinition::new(&task.task_type, &task.description, handler)
        .with_timeout_ms(task.timeout_ms.unwrap_or(engine.default_timeout_ms))
        .with_default_parameters(task.default_parameters.clone());

    if let Some(expression) = &task.cron_schedule {
        definition = definition.with_cron_schedule(expression);
    }

    if let Some(schema) = &task.parameters_schema {
        let schema = ParameterSchema::compile(schema.clone()).map_err(|e| {
            anyhow!("invalid parameters_schema for task '{}': {}", task.task_type, e)
        })?;
        definition = definition.with_parameters_schema(schema);
    }

    if let Some(retry) = &task.retry {
        let policy = retry_policy(retry)
            .with_context(|| format!("invalid retry policy for task '{}'", task.task_type))?;
        definition = definition.with_retry_policy(policy);
    }

    Ok(definition)
}

fn retry_policy(retry: &RetryConfig) -> Result<RetryPolicy> {
    let policy = RetryPolicy::new(retry.max_retries, retry.base_delay_ms, retry.max_delay_ms);
    if !retry.has_matchers() {
        return Ok(policy);
    }

    let mut matchers: Vec<ErrorMatcher> = retry
        .retryable_errors
        .iter()
        .flatten()
        .map(ErrorMatcher::substring)
        .collect();
    for pattern in retry.retryable_patterns.iter().flatten() {
        matchers.push(ErrorMatcher::pattern(pattern)?);
    }

    Ok(policy.with_retryable_errors(matchers))
}

/// Build the registry from every configured task.
pub fn build_registry(config: &Config) -> Result<TaskRegistry> {
    let definitions = config
        .tasks
        .iter()
        .map(|task| task_definition(task, &config.engine))
        .collect::<Result<Vec<_>>>()?;
    Ok(TaskRegistry::load(definitions)?)
}

/// Build a scheduler with an in-memory history. Nothing is scheduled yet.
pub fn build_scheduler(config: &Config) -> Result<Scheduler> {
    let registry = Arc::new(build_registry(config)?);
    let engine = Arc::new(ExecutionEngine::new(registry));
    let history = Arc::new(MemoryHistoryStore::new(config.history.capacity));
    debug!(
        tasks = engine.registry().len(),
        history_capacity = history.capacity(),
        "Scheduler components built"
    );
    Ok(Scheduler::new(engine, history, config.scheduler.event_buffer))
}
