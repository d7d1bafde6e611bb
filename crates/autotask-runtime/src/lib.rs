//! # autotask Runtime
//!
//! Runs tasks and remembers how they went.
//!
//! - [`ExecutionEngine`] - parameter validation, deadline race, retry with backoff
//! - [`RetryState`] - the iterative retry state machine driven by the engine
//! - [`HistoryStore`] / [`MemoryHistoryStore`] - bounded execution history

pub mod engine;
pub mod history;
pub mod retry;

pub use engine::{ExecutionEngine, PreparedExecution};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryStore, MemoryHistoryStore};
pub use retry::{RetryState, retry_execution_id, should_retry};
