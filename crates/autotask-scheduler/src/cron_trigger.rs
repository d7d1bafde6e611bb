//! CronTrigger - one live cron schedule entry.
//!
//! Each trigger owns a tokio task that sleeps until the next fire time of its
//! schedule and then invokes the tick callback. Fire times are computed from
//! the previous fire time, so a tick is never delivered twice. A tick that
//! lands well past its fire time (suspended host, blocked runtime) counts as
//! the single catch-up for everything missed; the trigger then resumes from
//! the current time instead of replaying each missed fire time.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use autotask_protocols::TaskError;

/// How late a tick may be delivered before missed fire times are skipped.
const MISSED_TICK_GRACE: Duration = Duration::from_secs(1);

/// Accept classic five-field expressions by prepending a zero seconds field.
///
/// Six and seven field expressions (with seconds, optionally years) pass
/// through with whitespace collapsed.
pub fn normalize_cron_expression(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Parse a cron expression into a schedule.
pub fn parse_cron(expression: &str) -> Result<Schedule, TaskError> {
    let invalid = |reason: String| TaskError::InvalidCronExpression {
        expression: expression.to_string(),
        reason,
    };

    if expression.trim().is_empty() {
        return Err(invalid("expression is empty".to_string()));
    }

    Schedule::from_str(&normalize_cron_expression(expression)).map_err(|e| invalid(e.to_string()))
}

/// A running cron trigger.
///
/// Dropping the trigger stops it.
pub struct CronTrigger {
    task_type: String,
    expression: String,
    schedule: Schedule,
    cancel: CancellationToken,
    fire_count: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl CronTrigger {
    /// Start a trigger that calls `on_tick` at every fire time of `schedule`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(
        task_type: impl Into<String>,
        expression: impl Into<String>,
        schedule: Schedule,
        on_tick: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let task_type = task_type.into();
        let cancel = CancellationToken::new();
        let fire_count = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run_trigger(
            task_type.clone(),
            schedule.clone(),
            cancel.clone(),
            fire_count.clone(),
            on_tick,
        ));

        Self {
            task_type,
            expression: expression.into(),
            schedule,
            cancel,
            fire_count,
            handle: Some(handle),
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// The expression as it was given.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Number of ticks delivered so far.
    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Next fire time, `None` once stopped or if the schedule has no future time.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_active() {
            return None;
        }
        self.schedule.upcoming(Utc).next()
    }

    /// Stop delivering ticks. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            debug!(task_type = %self.task_type, "Cron trigger stopped");
        }
    }

    /// Stop and wait for the trigger task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for CronTrigger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_trigger<F>(
    task_type: String,
    schedule: Schedule,
    cancel: CancellationToken,
    fire_count: Arc<AtomicU64>,
    on_tick: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    let mut last_fire = Utc::now();

    loop {
        let Some(next) = schedule.after(&last_fire).next() else {
            debug!(task_type = %task_type, "Cron schedule has no upcoming fire time");
            break;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!(task_type = %task_type, next = %next.to_rfc3339(), "Cron trigger waiting");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if cancel.is_cancelled() {
            break;
        }

        fire_count.fetch_add(1, Ordering::Relaxed);
        debug!(task_type = %task_type, scheduled_at = %next.to_rfc3339(), "Cron trigger fired");
        on_tick();

        let now = Utc::now();
        let late = (now - next).to_std().unwrap_or(Duration::ZERO);
        last_fire = if late > MISSED_TICK_GRACE {
            warn!(
                task_type = %task_type,
                late_ms = late.as_millis() as u64,
                "Cron trigger fell behind, skipping missed fire times"
            );
            now
        } else {
            next
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(normalize_cron_expression("*/5 * * * *"), "0 */5 * * * *");
    }

    #[test]
    fn test_normalize_six_fields_untouched() {
        assert_eq!(normalize_cron_expression("30  0 9 * * *"), "30 0 9 * * *");
    }

    #[test]
    fn test_parse_valid() {
        assert!(parse_cron("0 8 * * *").is_ok());
        assert!(parse_cron("0 0 9 * * MON-FRI").is_ok());
        assert!(parse_cron("0 0 0 1 1 * 2099").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse_cron("not a cron").unwrap_err();
        match err {
            TaskError::InvalidCronExpression { expression, .. } => {
                assert_eq!(expression, "not a cron")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_cron("").is_err());
        assert!(parse_cron("99 * * * *").is_err());
    }

    #[tokio::test]
    async fn test_trigger_metadata() {
        let schedule = parse_cron("0 0 * * *").unwrap();
        let trigger = CronTrigger::spawn("daily", "0 0 * * *", schedule, || {});

        assert_eq!(trigger.task_type(), "daily");
        assert_eq!(trigger.expression(), "0 0 * * *");
        assert!(trigger.is_active());
        assert!(trigger.next_fire_time().unwrap() > Utc::now());
        assert_eq!(trigger.fire_count(), 0);

        trigger.stop();
        assert!(!trigger.is_active());
        assert!(trigger.next_fire_time().is_none());
    }

    #[tokio::test]
    async fn test_trigger_fires() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let schedule = parse_cron("* * * * * *").unwrap();
        let trigger = CronTrigger::spawn("every-second", "* * * * * *", schedule, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 1);
        assert_eq!(trigger.fire_count(), ticks.load(Ordering::SeqCst) as u64);
        trigger.shutdown().await;
    }

    #[tokio::test]
    async fn test_stopped_trigger_never_fires() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let schedule = parse_cron("* * * * * *").unwrap();
        let trigger = CronTrigger::spawn("every-second", "* * * * * *", schedule, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        trigger.shutdown().await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stalled_runtime_delivers_one_catch_up_tick() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let schedule = parse_cron("* * * * * *").unwrap();
        let trigger = CronTrigger::spawn("every-second", "* * * * * *", schedule, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let before = ticks.load(Ordering::SeqCst);

        // Block the current-thread runtime across several fire times.
        std::thread::sleep(Duration::from_millis(4_500));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let after_stall = ticks.load(Ordering::SeqCst) - before;
        assert!(after_stall >= 1);
        assert!(after_stall <= 2, "missed ticks replayed in a burst: {after_stall}");

        trigger.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_trigger_stops() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let schedule = parse_cron("* * * * * *").unwrap();
        drop(CronTrigger::spawn("every-second", "* * * * * *", schedule, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
