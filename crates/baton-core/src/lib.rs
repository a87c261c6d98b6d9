//! Baton Core Library
//!
//! This crate provides the shared vocabulary used across all Baton components:
//! task identity and job units, the executor seam, cooperative cancellation,
//! shutdown phases, and wait deadlines.

pub mod cancel;
pub mod deadline;
pub mod executor;
pub mod phase;
pub mod task;

#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use deadline::Deadline;
pub use executor::{DirectExecutor, Executor, RejectedJob};
pub use phase::ShutdownPhase;
pub use task::{Job, Spawn, TaskContext, TaskId};
