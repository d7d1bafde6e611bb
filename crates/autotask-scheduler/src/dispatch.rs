//! Execution dispatch: run, record, notify.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use autotask_protocols::{ExecutionEvent, ExecutionRecord, ExecutionSummary, TaskError};
use autotask_runtime::{ExecutionEngine, HistoryStore};

use crate::events::EventBus;
use crate::metrics::SchedulerMetrics;

/// Runs one execution end to end.
///
/// Shared by manual calls and cron ticks.
pub struct TaskDispatcher {
    engine: Arc<ExecutionEngine>,
    history: Arc<dyn HistoryStore>,
    events: EventBus,
    metrics: Arc<SchedulerMetrics>,
}

impl TaskDispatcher {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        history: Arc<dyn HistoryStore>,
        events: EventBus,
        metrics: Arc<SchedulerMetrics>,
    ) -> Self {
        Self {
            engine,
            history,
            events,
            metrics,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Fresh execution ID. UUIDv7 keeps IDs time-ordered and unique across
    /// processes sharing one history backend.
    pub fn next_execution_id(&self) -> String {
        format!("exec-{}", Uuid::now_v7())
    }

    /// Execute a task and record the outcome.
    ///
    /// Unknown task types and invalid parameters fail before anything is
    /// published or recorded. Otherwise exactly one record is appended and one
    /// terminal event follows the start event. A failed history append is
    /// logged and counted; it never replaces the task's own outcome.
    pub async fn execute_task(
        &self,
        task_type: &str,
        parameters: Value,
    ) -> Result<ExecutionSummary, TaskError> {
        let prepared = self.engine.prepare(task_type, parameters)?;

        let execution_id = self.next_execution_id();
        let start_time = Utc::now();

        self.metrics.record_started();
        self.events.publish(ExecutionEvent::Started {
            execution_id: execution_id.clone(),
            task_type: task_type.to_string(),
            parameters: prepared.parameters.clone(),
            start_time,
        });
        info!(task_type = %task_type, execution_id = %execution_id, "Task started");

        let outcome = self.engine.run(&prepared, &execution_id).await;
        let end_time = Utc::now();

        let record = match &outcome {
            Ok(result) => ExecutionRecord::succeeded(
                &execution_id,
                task_type,
                prepared.parameters.clone(),
                start_time,
                end_time,
                result.clone(),
            ),
            Err(e) => ExecutionRecord::failed(
                &execution_id,
                task_type,
                prepared.parameters.clone(),
                start_time,
                end_time,
                e.to_string(),
            ),
        };
        let duration_ms = record.duration_ms;

        if let Err(e) = self.history.append(record).await {
            self.metrics.record_history_failure();
            error!(
                task_type = %task_type,
                execution_id = %execution_id,
                error = %e,
                "Failed to record execution history"
            );
        }

        match outcome {
            Ok(result) => {
                self.metrics.record_succeeded();
                self.events.publish(ExecutionEvent::Succeeded {
                    execution_id: execution_id.clone(),
                    task_type: task_type.to_string(),
                    duration_ms,
                    result: result.clone(),
                });
                info!(
                    task_type = %task_type,
                    execution_id = %execution_id,
                    duration_ms,
                    "Task succeeded"
                );
                Ok(ExecutionSummary {
                    execution_id,
                    success: true,
                    start_time,
                    end_time,
                    duration_ms,
                    result,
                })
            }
            Err(e) => {
                self.metrics.record_failed();
                self.events.publish(ExecutionEvent::Failed {
                    execution_id: execution_id.clone(),
                    task_type: task_type.to_string(),
                    duration_ms,
                    error: e.to_string(),
                });
                warn!(
                    task_type = %task_type,
                    execution_id = %execution_id,
                    duration_ms,
                    error = %e,
                    "Task failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use autotask_core::TaskRegistry;
    use autotask_runtime::MemoryHistoryStore;

    fn dispatcher() -> TaskDispatcher {
        let registry = Arc::new(TaskRegistry::load(Vec::new()).unwrap());
        TaskDispatcher::new(
            Arc::new(ExecutionEngine::new(registry)),
            Arc::new(MemoryHistoryStore::new(10)),
            EventBus::new(4),
            Arc::new(SchedulerMetrics::new()),
        )
    }

    #[test]
    fn test_execution_id_format() {
        let id = dispatcher().next_execution_id();
        let uuid = id.strip_prefix("exec-").unwrap();
        assert_eq!(Uuid::parse_str(uuid).unwrap().get_version_num(), 7);
    }

    #[test]
    fn test_ids_unique_across_dispatchers() {
        let first = dispatcher();
        let second = dispatcher();

        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(first.next_execution_id()));
            assert!(seen.insert(second.next_execution_id()));
        }
        assert_eq!(seen.len(), 2000);
    }
}
