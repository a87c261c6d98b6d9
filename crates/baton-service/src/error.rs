//! Service error types.
//!
//! Submission errors carry the rejected item back to the caller so nothing is
//! silently dropped; `Debug` is implemented by hand so the item type does not
//! need to be `Debug`.

use std::fmt;

use baton_queue::PutError;
use thiserror::Error;

/// Error from [`ShutdownCoordinator::request_accept`](crate::ShutdownCoordinator::request_accept):
/// the coordinator has left the running phase and refuses new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("service is shutting down; submission rejected")]
pub struct AcceptError;

/// Error from [`HandoffService::submit`](crate::HandoffService::submit). The
/// item always rides along and can be recovered with
/// [`into_item`](SubmitError::into_item).
#[derive(Error)]
pub enum SubmitError<T> {
    /// Shutdown had already been requested; the item was never accepted.
    #[error("service is shut down")]
    Shutdown(T),
    /// The producer's cancellation token fired while the handoff was
    /// blocked. The token is left set.
    #[error("blocking submit was cancelled")]
    Cancelled(T),
    /// The queue was closed under the submission by an abrupt stop.
    #[error("service queue is closed")]
    Closed(T),
}

impl<T> SubmitError<T> {
    /// Returns the item that failed to hand off.
    pub fn into_item(self) -> T {
        match self {
            SubmitError::Shutdown(item) => item,
            SubmitError::Cancelled(item) => item,
            SubmitError::Closed(item) => item,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, SubmitError::Shutdown(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubmitError::Cancelled(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SubmitError::Closed(_))
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Shutdown(_) => f.write_str("Shutdown(..)"),
            SubmitError::Cancelled(_) => f.write_str("Cancelled(..)"),
            SubmitError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> From<PutError<T>> for SubmitError<T> {
    fn from(err: PutError<T>) -> Self {
        match err {
            PutError::Cancelled(item) => SubmitError::Cancelled(item),
            PutError::Closed(item) => SubmitError::Closed(item),
            // An untimed put reports full only when the queue refuses
            // storage outright; to the producer that is a closed handoff.
            PutError::Full(item) => SubmitError::Closed(item),
        }
    }
}

/// Error from [`HandoffService::start`](crate::HandoffService::start).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The consumer thread could not be spawned.
    #[error("failed to spawn consumer thread: {0}")]
    ConsumerSpawn(#[from] std::io::Error),
}

/// Error from [`TrackingExecutor::cancelled_tasks`](crate::TrackingExecutor::cancelled_tasks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// The wrapped executor has not terminated; the cancelled set can still
    /// grow and a snapshot would be misleading.
    #[error("wrapped executor has not terminated; cancelled set is not final")]
    ExecutorStillRunning,
}
