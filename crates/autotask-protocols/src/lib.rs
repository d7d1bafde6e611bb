//! # autotask Protocols
//!
//! Shared contracts for the autotask scheduling engine.
//!
//! This crate defines what every other crate agrees on:
//!
//! - [`handler::TaskHandler`]: the opaque unit of work a task runs
//! - [`definition::TaskDefinition`]: immutable per-task-type configuration
//! - [`record::ExecutionRecord`]: one finalized execution in the history
//! - [`event::ExecutionEvent`]: lifecycle notifications
//! - [`error::TaskError`]: the error taxonomy surfaced to callers

pub mod definition;
pub mod error;
pub mod event;
pub mod handler;
pub mod record;

pub use definition::{
    DEFAULT_TIMEOUT_MS, ErrorMatcher, ParameterSchema, RetryPolicy, TaskDefinition,
    TaskDefinitionInfo,
};
pub use error::{HandlerError, HistoryError, TaskError};
pub use event::ExecutionEvent;
pub use handler::{FnHandler, HandlerContext, TaskHandler, handler_fn};
pub use record::{
    ExecutionRecord, ExecutionSummary, HistoryPage, HistoryQuery, Pagination, SortField,
    SortOrder, duration_ms,
};
