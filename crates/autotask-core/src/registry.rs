//! Task registry.
//!
//! Built once from a set of definitions and read-only afterwards, so lookups
//! need no locking. Callers share it behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use autotask_protocols::{TaskDefinition, TaskDefinitionInfo, TaskError};
use tracing::debug;

use crate::error::RegistryError;

/// Registry mapping task types to their definitions.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    definitions: HashMap<String, Arc<TaskDefinition>>,
}

impl TaskRegistry {
    /// Build the registry.
    ///
    /// Fails on the first duplicate task type or malformed definition.
    pub fn load(
        definitions: impl IntoIterator<Item = TaskDefinition>,
    ) -> Result<Self, RegistryError> {
        let mut map = HashMap::new();

        for definition in definitions {
            Self::check(&definition)?;

            let task_type = definition.task_type.clone();
            if map.contains_key(&task_type) {
                return Err(RegistryError::DuplicateTaskType(task_type));
            }

            debug!(
                task_type = %task_type,
                timeout_ms = definition.timeout_ms,
                cron = ?definition.cron_schedule,
                "Registered task definition"
            );
            map.insert(task_type, Arc::new(definition));
        }

        Ok(Self { definitions: map })
    }

    fn check(definition: &TaskDefinition) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidDefinition {
            task_type: definition.task_type.clone(),
            reason: reason.to_string(),
        };

        if definition.task_type.trim().is_empty() {
            return Err(invalid("task type cannot be empty"));
        }
        if definition.timeout_ms == 0 {
            return Err(invalid("timeout must be greater than 0"));
        }
        if let Some(policy) = &definition.retry_policy {
            if policy.base_delay_ms > policy.max_delay_ms {
                return Err(invalid("retry base delay exceeds max delay"));
            }
        }
        Ok(())
    }

    /// Resolve a task type.
    pub fn lookup(&self, task_type: &str) -> Result<Arc<TaskDefinition>, TaskError> {
        self.definitions
            .get(task_type)
            .cloned()
            .ok_or_else(|| TaskError::UnknownTaskType(task_type.to_string()))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.definitions.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Registered task types in lexical order.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.definitions.keys().cloned().collect();
        types.sort();
        types
    }

    /// Definitions carrying a cron schedule, as `(task_type, expression)`.
    pub fn cron_schedules(&self) -> Vec<(String, String)> {
        let mut schedules: Vec<(String, String)> = self
            .definitions
            .values()
            .filter_map(|d| {
                d.cron_schedule
                    .as_ref()
                    .map(|expr| (d.task_type.clone(), expr.clone()))
            })
            .collect();
        schedules.sort();
        schedules
    }

    /// Read-only snapshot of every definition, sorted by task type.
    pub fn definitions(&self) -> Vec<TaskDefinitionInfo> {
        let mut infos: Vec<TaskDefinitionInfo> =
            self.definitions.values().map(|d| d.info()).collect();
        infos.sort_by(|a, b| a.task_type.cmp(&b.task_type));
        infos
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
