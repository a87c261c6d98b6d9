//! The blocking queue trait implemented by every queue variant.

use std::time::Duration;

use baton_core::CancelToken;

use crate::error::{PutError, TakeError};

/// A thread-safe queue with blocking, timed, and non-blocking endpoints.
///
/// Blocking calls suspend on the queue's own condition machinery; no caller
/// ever holds a queue lock across a wait. Cancellation is cooperative: each
/// blocked call checks its token before the first wait and immediately after
/// every wakeup, and a call that aborts leaves the token set so callers
/// composing several blocking calls observe the signal at every level.
///
/// Closing is one-way and producer-biased: after [`close`](Self::close)
/// every insertion fails with [`PutError::Closed`] while removals keep
/// draining buffered items and only then report [`TakeError::Closed`].
pub trait BlockingQueue<T>: Send + Sync {
    /// Inserts `item`, waiting for space as long as it takes.
    fn put(&self, item: T, token: &CancelToken) -> Result<(), PutError<T>>;

    /// Inserts `item`, waiting at most `timeout`. Expiry is an ordinary
    /// [`PutError::Full`] return, never a panic.
    fn put_timeout(
        &self,
        item: T,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<(), PutError<T>>;

    /// Inserts `item` only if that needs no waiting.
    fn try_put(&self, item: T) -> Result<(), PutError<T>>;

    /// Removes the next item, waiting for one as long as it takes.
    fn take(&self, token: &CancelToken) -> Result<T, TakeError>;

    /// Removes the next item, waiting at most `timeout`. Expiry is an
    /// ordinary [`TakeError::Empty`] return, never a panic.
    fn take_timeout(&self, timeout: Duration, token: &CancelToken) -> Result<T, TakeError>;

    /// Removes the next item only if that needs no waiting.
    fn try_take(&self) -> Result<T, TakeError>;

    /// Items currently buffered. Never negative by construction; a
    /// rendezvous queue always reports zero.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity limit, or `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Closes the queue to producers. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Removes and returns everything currently buffered, in delivery order.
    /// The snapshot is taken under the queue lock; blocked producers get a
    /// chance to run afterwards.
    fn drain(&self) -> Vec<T>;
}
