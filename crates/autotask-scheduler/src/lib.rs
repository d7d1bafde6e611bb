//! # autotask Scheduler
//!
//! The scheduler controller: owns the live cron schedule table, dispatches
//! executions through the engine, records history and publishes lifecycle
//! events.
//!
//! ## Components
//!
//! - [`Scheduler`] - public operations (schedule, execute, history, readiness, shutdown)
//! - [`CronTrigger`] - one live cron schedule entry
//! - [`TaskDispatcher`] - the execute → record → notify pipeline
//! - [`EventBus`] - broadcast channel of [`ExecutionEvent`](autotask_protocols::ExecutionEvent)
//! - [`SchedulerMetrics`] - execution counters

pub mod cron_trigger;
pub mod dispatch;
pub mod events;
pub mod metrics;
pub mod scheduler;

pub use cron_trigger::{CronTrigger, normalize_cron_expression, parse_cron};
pub use dispatch::TaskDispatcher;
pub use events::EventBus;
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use scheduler::{ScheduleInfo, Scheduler};
