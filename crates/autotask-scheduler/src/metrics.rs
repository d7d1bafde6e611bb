//! Scheduler metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Executions that passed validation and started.
    pub executions_started: AtomicU64,

    pub executions_succeeded: AtomicU64,

    /// Terminal failures (after retries).
    pub executions_failed: AtomicU64,

    /// History appends that failed and were swallowed.
    pub history_write_failures: AtomicU64,

    /// Cron ticks delivered across all triggers.
    pub cron_ticks: AtomicU64,

    /// Executions currently in flight.
    pub active_executions: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
        self.active_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self) {
        self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
        self.finish();
    }

    pub fn record_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
        self.finish();
    }

    pub fn record_history_failure(&self) {
        self.history_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cron_tick(&self) {
        self.cron_ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        let _ = self
            .active_executions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions_started: self.executions_started.load(Ordering::Relaxed),
            executions_succeeded: self.executions_succeeded.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            history_write_failures: self.history_write_failures.load(Ordering::Relaxed),
            cron_ticks: self.cron_ticks.load(Ordering::Relaxed),
            active_executions: self.active_executions.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of scheduler metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub executions_started: u64,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub history_write_failures: u64,
    pub cron_ticks: u64,
    pub active_executions: u64,
}
