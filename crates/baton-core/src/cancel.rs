//! Cooperative cancellation token.
//!
//! A `CancelToken` is an advisory flag shared between the owner of a worker
//! activity and the activity itself. Cancelling never preempts anything: the
//! target checks the token at its blocking checkpoints (before the next take,
//! immediately after waking from a wait) and unwinds on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag with signal and query-and-clear operations.
///
/// Cloning is cheap and all clones observe the same flag. A blocking call that
/// aborts because of this token leaves it set, so callers that compose several
/// blocking calls see the signal at every level; only the owning thread should
/// [`clear`](CancelToken::clear) it once the signal has been fully handled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true if cancellation has been requested and not yet cleared.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Atomically reads and clears the flag, returning the prior value.
    ///
    /// This is the "query-and-clear" half of the cancellation contract: the
    /// owning thread acknowledges the signal exactly once.
    pub fn clear(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}
