//! Scheduler controller.
//!
//! Owns the schedule table (at most one live [`CronTrigger`] per task type)
//! and the readiness flag, and exposes manual execution and history reads.
//!
//! No mutual exclusion is enforced between executions of the same task type:
//! a cron tick and a manual call, or two ticks of a slow handler, may overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use autotask_core::TaskRegistry;
use autotask_protocols::{
    ExecutionEvent, ExecutionSummary, HistoryError, HistoryPage, HistoryQuery,
    TaskDefinitionInfo, TaskError,
};
use autotask_runtime::{ExecutionEngine, HistoryStore};

use crate::cron_trigger::{CronTrigger, parse_cron};
use crate::dispatch::TaskDispatcher;
use crate::events::EventBus;
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};

/// One row of the schedule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    pub task_type: String,
    pub cron_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_time: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

/// The scheduler controller.
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    dispatcher: Arc<TaskDispatcher>,
    schedules: DashMap<String, CronTrigger>,
    ready: AtomicBool,
    events: EventBus,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    /// Create a scheduler. Nothing is scheduled until [`initialize`](Self::initialize).
    pub fn new(
        engine: Arc<ExecutionEngine>,
        history: Arc<dyn HistoryStore>,
        event_buffer: usize,
    ) -> Self {
        let registry = engine.registry().clone();
        let events = EventBus::new(event_buffer);
        let metrics = Arc::new(SchedulerMetrics::new());
        let dispatcher = Arc::new(TaskDispatcher::new(
            engine,
            history,
            events.clone(),
            metrics.clone(),
        ));

        Self {
            registry,
            dispatcher,
            schedules: DashMap::new(),
            ready: AtomicBool::new(false),
            events,
            metrics,
        }
    }

    /// Install a trigger for every definition carrying a cron schedule and
    /// mark the scheduler ready.
    ///
    /// The first invalid expression aborts startup; triggers installed before
    /// it stay in place and the scheduler stays not ready.
    pub fn initialize(&self) -> Result<(), TaskError> {
        let schedules = self.registry.cron_schedules();
        info!(count = schedules.len(), "Initializing scheduler");

        for (task_type, expression) in &schedules {
            self.schedule_task(task_type, expression)?;
        }

        self.ready.store(true, Ordering::SeqCst);
        info!(scheduled = self.schedules.len(), "Scheduler ready");
        Ok(())
    }

    /// Schedule `task_type` on `cron_expression`, replacing any existing entry.
    ///
    /// Validation happens before the table is touched, so a failure leaves the
    /// current schedule for this task type running. Must be called from within
    /// a tokio runtime.
    pub fn schedule_task(&self, task_type: &str, cron_expression: &str) -> Result<(), TaskError> {
        if !self.registry.contains(task_type) {
            return Err(TaskError::UnknownTaskType(task_type.to_string()));
        }
        let schedule = parse_cron(cron_expression)?;

        // The entry guard holds the shard lock: stopping the old trigger and
        // installing the new one happen as one step per task type.
        match self.schedules.entry(task_type.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get().stop();
                let trigger = self.spawn_trigger(task_type, cron_expression, schedule);
                entry.insert(trigger);
                info!(task_type = %task_type, cron = %cron_expression, "Task rescheduled");
            }
            Entry::Vacant(entry) => {
                let trigger = self.spawn_trigger(task_type, cron_expression, schedule);
                entry.insert(trigger);
                info!(task_type = %task_type, cron = %cron_expression, "Task scheduled");
            }
        }

        Ok(())
    }

    fn spawn_trigger(
        &self,
        task_type: &str,
        cron_expression: &str,
        schedule: cron::Schedule,
    ) -> CronTrigger {
        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        let tick_type = task_type.to_string();

        CronTrigger::spawn(task_type, cron_expression, schedule, move || {
            metrics.record_cron_tick();
            let dispatcher = dispatcher.clone();
            let task_type = tick_type.clone();
            tokio::spawn(async move {
                // A failed tick ends that tick only.
                if let Err(e) = dispatcher
                    .execute_task(&task_type, Value::Object(Map::new()))
                    .await
                {
                    warn!(task_type = %task_type, error = %e, "Scheduled execution failed");
                }
            });
        })
    }

    /// Remove the schedule for `task_type`. Returns whether one existed.
    pub fn unschedule_task(&self, task_type: &str) -> bool {
        match self.schedules.remove(task_type) {
            Some((_, trigger)) => {
                trigger.stop();
                info!(task_type = %task_type, "Task unscheduled");
                true
            }
            None => false,
        }
    }

    /// Run a task now.
    ///
    /// Returns the success envelope, or the terminal error after the outcome
    /// has been recorded.
    pub async fn execute_task(
        &self,
        task_type: &str,
        parameters: Value,
    ) -> Result<ExecutionSummary, TaskError> {
        self.dispatcher.execute_task(task_type, parameters).await
    }

    /// Read execution history.
    pub async fn get_history(
        &self,
        task_type: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, HistoryError> {
        self.dispatcher.history().query(task_type, query).await
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stop every trigger, clear the table and drop readiness. Idempotent.
    ///
    /// In-flight executions are not waited for.
    pub async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);

        let task_types: Vec<String> = self.schedules.iter().map(|e| e.key().clone()).collect();
        let mut stopped = Vec::with_capacity(task_types.len());
        for task_type in task_types {
            if let Some((_, trigger)) = self.schedules.remove(&task_type) {
                trigger.stop();
                stopped.push(trigger);
            }
        }

        let count = stopped.len();
        for trigger in stopped {
            trigger.shutdown().await;
        }

        if count > 0 {
            info!(stopped = count, "Scheduler shut down");
        } else {
            debug!("Scheduler shutdown with no live schedules");
        }
    }

    /// Read-only snapshot of the registry.
    pub fn task_definitions(&self) -> Vec<TaskDefinitionInfo> {
        self.registry.definitions()
    }

    /// Current schedule table, sorted by task type.
    pub fn schedules(&self) -> Vec<ScheduleInfo> {
        let mut rows: Vec<ScheduleInfo> = self
            .schedules
            .iter()
            .map(|entry| {
                let trigger = entry.value();
                ScheduleInfo {
                    task_type: entry.key().clone(),
                    cron_expression: trigger.expression().to_string(),
                    next_fire_time: trigger.next_fire_time(),
                    fire_count: trigger.fire_count(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.task_type.cmp(&b.task_type));
        rows
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
