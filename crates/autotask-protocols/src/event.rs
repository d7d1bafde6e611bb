//! Execution lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle notification for one execution.
///
/// For a given `execution_id`, `Started` is always delivered before the
/// matching `Succeeded` or `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Started {
        execution_id: String,
        task_type: String,
        parameters: Value,
        start_time: DateTime<Utc>,
    },
    Succeeded {
        execution_id: String,
        task_type: String,
        duration_ms: u64,
        result: Value,
    },
    Failed {
        execution_id: String,
        task_type: String,
        duration_ms: u64,
        error: String,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::Started { execution_id, .. }
            | ExecutionEvent::Succeeded { execution_id, .. }
            | ExecutionEvent::Failed { execution_id, .. } => execution_id,
        }
    }

    pub fn task_type(&self) -> &str {
        match self {
            ExecutionEvent::Started { task_type, .. }
            | ExecutionEvent::Succeeded { task_type, .. }
            | ExecutionEvent::Failed { task_type, .. } => task_type,
        }
    }

    /// Whether this event closes an execution.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionEvent::Started { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let event = ExecutionEvent::Failed {
            execution_id: "exec-1".to_string(),
            task_type: "sync".to_string(),
            duration_ms: 10,
            error: "boom".to_string(),
        };
        assert_eq!(event.execution_id(), "exec-1");
        assert_eq!(event.task_type(), "sync");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_started_not_terminal() {
        let event = ExecutionEvent::Started {
            execution_id: "exec-1".to_string(),
            task_type: "sync".to_string(),
            parameters: json!({}),
            start_time: Utc::now(),
        };
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_tagged_serialization() {
        let event = ExecutionEvent::Succeeded {
            execution_id: "exec-1".to_string(),
            task_type: "sync".to_string(),
            duration_ms: 5,
            result: json!(1),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "succeeded");
        assert_eq!(value["duration_ms"], 5);
    }
}
