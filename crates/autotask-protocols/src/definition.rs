//! Task definition types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handler::TaskHandler;

/// Timeout applied when a definition does not set one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Definition of a task type.
///
/// Created once while loading the registry and never mutated afterwards.
#[derive(Clone)]
pub struct TaskDefinition {
    /// Unique key within one registry.
    pub task_type: String,

    /// Human-readable description.
    pub description: String,

    /// The unit of work.
    pub handler: Arc<dyn TaskHandler>,

    /// Cron expression installed by the scheduler on initialization.
    pub cron_schedule: Option<String>,

    /// Schema explicit parameters are validated against.
    pub parameters_schema: Option<ParameterSchema>,

    /// Parameters merged under the explicit ones.
    pub default_parameters: Map<String, Value>,

    /// Deadline for a single attempt.
    pub timeout_ms: u64,

    /// Retry behaviour on handler failure. `None` disables retries.
    pub retry_policy: Option<RetryPolicy>,
}

impl TaskDefinition {
    /// Create a new task definition.
    pub fn new(
        task_type: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            handler,
            cron_schedule: None,
            parameters_schema: None,
            default_parameters: Map::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_policy: None,
        }
    }

    /// Set the cron schedule.
    pub fn with_cron_schedule(mut self, expression: impl Into<String>) -> Self {
        self.cron_schedule = Some(expression.into());
        self
    }

    /// Set the parameters schema.
    pub fn with_parameters_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameters_schema = Some(schema);
        self
    }

    /// Set the default parameters.
    pub fn with_default_parameters(mut self, defaults: Map<String, Value>) -> Self {
        self.default_parameters = defaults;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Read-only, serializable view without the handler.
    pub fn info(&self) -> TaskDefinitionInfo {
        TaskDefinitionInfo {
            task_type: self.task_type.clone(),
            description: self.description.clone(),
            cron_schedule: self.cron_schedule.clone(),
            parameters_schema: self.parameters_schema.as_ref().map(|s| s.raw().clone()),
            default_parameters: self.default_parameters.clone(),
            timeout_ms: self.timeout_ms,
            retry_policy: self.retry_policy.as_ref().map(RetryPolicy::info),
        }
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("task_type", &self.task_type)
            .field("description", &self.description)
            .field("cron_schedule", &self.cron_schedule)
            .field("parameters_schema", &self.parameters_schema)
            .field("default_parameters", &self.default_parameters)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

/// A compiled JSON Schema for task parameters.
#[derive(Clone)]
pub struct ParameterSchema {
    raw: Value,
    validator: Arc<jsonschema::Validator>,
}

impl ParameterSchema {
    /// Compile a JSON Schema document.
    pub fn compile(schema: Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            raw: schema,
            validator: Arc::new(validator),
        })
    }

    /// The schema document as written.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Validate an instance, joining every violation into one message.
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages.join("; "))
        }
    }
}

impl fmt::Debug for ParameterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParameterSchema").field(&self.raw).finish()
    }
}

/// Matches an error message to decide whether it is retryable.
#[derive(Debug, Clone)]
pub enum ErrorMatcher {
    /// Plain substring match.
    Substring(String),
    /// Regular expression match.
    Pattern(Regex),
}

impl ErrorMatcher {
    /// Substring matcher.
    pub fn substring(value: impl Into<String>) -> Self {
        ErrorMatcher::Substring(value.into())
    }

    /// Regex matcher.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(ErrorMatcher::Pattern)
    }

    pub fn matches(&self, message: &str) -> bool {
        match self {
            ErrorMatcher::Substring(s) => message.contains(s.as_str()),
            ErrorMatcher::Pattern(re) => re.is_match(message),
        }
    }
}

impl fmt::Display for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMatcher::Substring(s) => write!(f, "{}", s),
            ErrorMatcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Retry policy for a task type.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles for every further retry.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay.
    pub max_delay_ms: u64,

    /// Matchers for retryable errors. `None` retries every error.
    pub retryable_errors: Option<Vec<ErrorMatcher>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            retryable_errors: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that retries every error.
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            retryable_errors: None,
        }
    }

    /// Restrict retries to errors matching one of `matchers`.
    pub fn with_retryable_errors(mut self, matchers: Vec<ErrorMatcher>) -> Self {
        self.retryable_errors = Some(matchers);
        self
    }

    /// Whether an error message qualifies for a retry.
    pub fn is_retryable(&self, message: &str) -> bool {
        match &self.retryable_errors {
            None => true,
            Some(matchers) => matchers.iter().any(|m| m.matches(message)),
        }
    }

    /// Backoff before retry number `retry_count` (1-based):
    /// `min(base * 2^(retry_count - 1), max)`.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn info(&self) -> RetryPolicyInfo {
        RetryPolicyInfo {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            retryable_errors: self
                .retryable_errors
                .as_ref()
                .map(|m| m.iter().map(ToString::to_string).collect()),
        }
    }
}

/// Serializable snapshot of a [`TaskDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionInfo {
    pub task_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters_schema: Option<Value>,
    #[serde(default)]
    pub default_parameters: Map<String, Value>,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicyInfo>,
}

/// Serializable snapshot of a [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyInfo {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<String>>,
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
