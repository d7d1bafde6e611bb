//! Task handler trait definition.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;

/// Context handed to a handler for one attempt.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Execution ID of this attempt. Retries carry a derived ID.
    pub execution_id: String,

    /// Task type being executed.
    pub task_type: String,

    /// Zero for the first attempt, then the retry count.
    pub attempt: u32,

    /// Span carrying `task_type` / `execution_id`; the handler future runs inside it.
    pub span: tracing::Span,
}

impl HandlerContext {
    /// Create a new handler context with its own span.
    pub fn new(task_type: impl Into<String>, execution_id: impl Into<String>, attempt: u32) -> Self {
        let task_type = task_type.into();
        let execution_id = execution_id.into();
        let span = tracing::info_span!(
            "task",
            task_type = %task_type,
            execution_id = %execution_id,
            attempt
        );
        Self {
            execution_id,
            task_type,
            attempt,
            span,
        }
    }

    /// Whether this attempt is a retry.
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Core trait for task handlers.
///
/// A handler is an opaque unit of work. The engine enforces its deadline and
/// retries it; it never inspects what the handler does.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task with already validated and merged parameters.
    async fn handle(&self, params: Value, ctx: HandlerContext) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, params: Value, ctx: HandlerContext) -> Result<Value, HandlerError> {
        (self.f)(params, ctx).await
    }
}

/// Wrap an async closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}
