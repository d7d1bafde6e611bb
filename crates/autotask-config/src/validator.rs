//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{Config, RetryConfig};

/// History capacity above which a warning is emitted.
const LARGE_HISTORY_CAPACITY: usize = 100_000;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse into a single error if anything failed.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.first() {
            Some(first) => Err(ConfigError::InvalidValue {
                field: first.path.clone(),
                message: first.message.clone(),
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_engine(config, &mut result);
        Self::validate_history(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_tasks(config, &mut result);

        Ok(result)
    }

    fn validate_engine(config: &Config, result: &mut ValidationResult) {
        if config.engine.default_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "engine.default_timeout_ms",
                "default_timeout_ms must be greater than 0",
            ));
        }
    }

    fn validate_history(config: &Config, result: &mut ValidationResult) {
        if config.history.capacity == 0 {
            result.add_error(ValidationError::new(
                "history.capacity",
                "capacity must be greater than 0",
            ));
        }

        if config.history.capacity > LARGE_HISTORY_CAPACITY {
            result.add_warning(ValidationWarning::new(
                "history.capacity",
                "capacity is very high (>100000), history is held in memory",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        if config.scheduler.event_buffer == 0 {
            result.add_error(ValidationError::new(
                "scheduler.event_buffer",
                "event_buffer must be greater than 0",
            ));
        }
    }

    fn validate_tasks(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (index, task) in config.tasks.iter().enumerate() {
            let path = format!("tasks[{}]", index);

            if task.task_type.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.task_type", path),
                    "task_type cannot be empty",
                ));
            } else if !seen.insert(task.task_type.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.task_type", path),
                    format!("duplicate task_type '{}'", task.task_type),
                ));
            }

            if task.handler.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.handler", path),
                    "handler cannot be empty",
                ));
            }

            if task.timeout_ms == Some(0) {
                result.add_error(ValidationError::new(
                    format!("{}.timeout_ms", path),
                    "timeout_ms must be greater than 0",
                ));
            }

            if let Some(cron) = &task.cron_schedule {
                if cron.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("{}.cron_schedule", path),
                        "cron_schedule cannot be empty",
                    ));
                }
            }

            if let Some(retry) = &task.retry {
                Self::validate_retry(&format!("{}.retry", path), retry, result);
            }
        }
    }

    fn validate_retry(path: &str, retry: &RetryConfig, result: &mut ValidationResult) {
        if retry.base_delay_ms > retry.max_delay_ms {
            result.add_error(ValidationError::new(
                format!("{}.base_delay_ms", path),
                "base_delay_ms cannot exceed max_delay_ms",
            ));
        }

        if retry.max_retries > 0 && retry.base_delay_ms == 0 {
            result.add_warning(ValidationWarning::new(
                format!("{}.base_delay_ms", path),
                "retries without delay will hammer the failing dependency",
            ));
        }

        for (i, pattern) in retry.retryable_patterns.iter().flatten().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                result.add_error(ValidationError::new(
                    format!("{}.retryable_patterns[{}]", path, i),
                    format!("invalid regular expression: {}", e),
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
