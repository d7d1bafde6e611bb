//! # autotask Core
//!
//! The task registry: a read-only mapping from task type to
//! [`TaskDefinition`](autotask_protocols::TaskDefinition), built once at startup.

pub mod error;
pub mod registry;

pub use error::RegistryError;
pub use registry::TaskRegistry;
