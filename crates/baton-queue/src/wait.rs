//! Shared condvar wait step for deadline-bounded, cancellable blocking.

use std::time::Duration;

use baton_core::Deadline;
use parking_lot::{Condvar, MutexGuard};

/// Upper bound on one condvar wait. Notifications end a wait immediately;
/// this only bounds how long a blocked thread can go without re-checking its
/// cancellation token.
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Outcome of one bounded wait on a queue condvar.
pub(crate) enum WaitStep {
    /// Woken or poll slice elapsed; re-check token and predicate.
    Again,
    /// The operation deadline has passed.
    DeadlineExpired,
}

/// Waits on `cv` for one slice, releasing `guard` for the duration.
pub(crate) fn wait_step<T: ?Sized>(
    cv: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: &Deadline,
) -> WaitStep {
    let slice = match deadline.remaining() {
        None => CANCEL_POLL,
        Some(rem) if rem.is_zero() => return WaitStep::DeadlineExpired,
        Some(rem) => rem.min(CANCEL_POLL),
    };
    let _ = cv.wait_for(guard, slice);
    WaitStep::Again
}
