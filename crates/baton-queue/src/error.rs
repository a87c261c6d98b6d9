//! Queue error types.
//!
//! Insertion errors carry the rejected item back to the caller so nothing is
//! silently dropped; `Debug` is implemented by hand so the item type does not
//! need to be `Debug`.

use std::fmt;

use thiserror::Error;

/// Error from a queue insertion. The item always rides along and can be
/// recovered with [`into_item`](PutError::into_item).
#[derive(Error)]
pub enum PutError<T> {
    /// The queue stayed at capacity for the whole wait budget.
    #[error("queue is full")]
    Full(T),
    /// The waiter's cancellation token fired. The token is left set.
    #[error("blocking put was cancelled")]
    Cancelled(T),
    /// The queue has been closed to producers.
    #[error("queue is closed")]
    Closed(T),
}

impl<T> PutError<T> {
    /// Returns the item that failed to enqueue.
    pub fn into_item(self) -> T {
        match self {
            PutError::Full(item) => item,
            PutError::Cancelled(item) => item,
            PutError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PutError::Full(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PutError::Cancelled(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PutError::Closed(_))
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.write_str("Full(..)"),
            PutError::Cancelled(_) => f.write_str("Cancelled(..)"),
            PutError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Error from a queue removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TakeError {
    /// The queue stayed empty for the whole wait budget.
    #[error("queue is empty")]
    Empty,
    /// The waiter's cancellation token fired. The token is left set.
    #[error("blocking take was cancelled")]
    Cancelled,
    /// The queue is closed and fully drained.
    #[error("queue is closed and drained")]
    Closed,
}

impl TakeError {
    pub fn is_empty(&self) -> bool {
        matches!(self, TakeError::Empty)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TakeError::Cancelled)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TakeError::Closed)
    }
}
