//! Built-in task handlers.
//!
//! Real deployments bind their own handlers; these cover smoke tests,
//! heartbeats and exercising the timeout and retry paths from configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use autotask_protocols::{HandlerContext, HandlerError, TaskHandler};

/// Names accepted in `tasks.handler`.
pub const BUILTIN_HANDLERS: &[&str] = &["noop", "echo", "sleep", "fail"];

/// Resolve a built-in handler by name.
pub fn builtin_handler(name: &str) -> Option<Arc<dyn TaskHandler>> {
    let handler: Arc<dyn TaskHandler> = match name {
        "noop" => Arc::new(NoopHandler),
        "echo" => Arc::new(EchoHandler),
        "sleep" => Arc::new(SleepHandler),
        "fail" => Arc::new(FailHandler),
        _ => return None,
    };
    Some(handler)
}

/// Succeeds immediately with no result.
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn handle(&self, _params: Value, _ctx: HandlerContext) -> Result<Value, HandlerError> {
        Ok(Value::Null)
    }
}

/// Returns its parameters.
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(&self, params: Value, ctx: HandlerContext) -> Result<Value, HandlerError> {
        info!(execution_id = %ctx.execution_id, "echo");
        Ok(params)
    }
}

/// Sleeps for `ms` milliseconds (default 1000).
pub struct SleepHandler;

#[async_trait]
impl TaskHandler for SleepHandler {
    async fn handle(&self, params: Value, _ctx: HandlerContext) -> Result<Value, HandlerError> {
        let ms = match params.get("ms") {
            None => 1_000,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| HandlerError::new("'ms' must be a non-negative integer"))?,
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "sleptMs": ms }))
    }
}

/// Always fails with `message` (default "requested failure").
pub struct FailHandler;

#[async_trait]
impl TaskHandler for FailHandler {
    async fn handle(&self, params: Value, _ctx: HandlerContext) -> Result<Value, HandlerError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(HandlerError::new(message))
    }
}
