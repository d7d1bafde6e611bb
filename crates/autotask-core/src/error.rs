//! Registry errors.

use thiserror::Error;

/// Errors raised while loading the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate task type: {0}")]
    DuplicateTaskType(String),

    #[error("Invalid definition for task '{task_type}': {reason}")]
    InvalidDefinition { task_type: String, reason: String },
}
