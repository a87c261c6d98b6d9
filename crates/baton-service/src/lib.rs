//! Baton Service Library
//!
//! Producer-consumer lifecycle management: a coordinator that makes the
//! accept/drain/terminate handoff race-free, a service wrapping a blocking
//! queue and one consumer thread behind a submit/stop lifecycle, and an
//! executor wrapper that records which jobs an abrupt shutdown may have cut
//! short.

pub mod coordinator;
pub mod error;
pub mod service;
pub mod sink;
pub mod tracking;

// Re-export commonly used types
pub use coordinator::ShutdownCoordinator;
pub use error::{AcceptError, ServiceError, SubmitError, TrackingError};
pub use service::{HandoffConfig, HandoffService};
pub use sink::Sink;
pub use tracking::TrackingExecutor;
