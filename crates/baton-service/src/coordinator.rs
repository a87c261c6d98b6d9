//! Race-free accept/drain/terminate coordination.
//!
//! Checking "is the service still running?" and then enqueueing is a
//! check-then-act race: shutdown can slip between the two and either strand
//! the item or reject work the service already promised to take. The
//! coordinator closes the window by counting a reservation inside the same
//! critical section as the phase check. A producer that holds a reservation
//! is owed delivery; the consumer keeps draining until the phase has left
//! running, the queue is empty, and every reservation is settled.

use std::time::Duration;

use baton_core::{Deadline, ShutdownPhase};
use parking_lot::{Condvar, Mutex};

use crate::error::AcceptError;

/// Accept gate and termination detector for a producer-consumer service.
///
/// The coordinator owns the shutdown phase and the count of accepted but not
/// yet consumed items. It does not wake blocked parties itself; the owning
/// service pairs phase changes with its own wakeup mechanism (bounded idle
/// waits or closing the queue).
pub struct ShutdownCoordinator {
    inner: Mutex<CoordState>,
    terminated: Condvar,
}

struct CoordState {
    phase: ShutdownPhase,
    reservations: usize,
}

impl ShutdownCoordinator {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CoordState {
                phase: ShutdownPhase::Running,
                reservations: 0,
            }),
            terminated: Condvar::new(),
        }
    }

    /// Atomically checks the phase and reserves one delivery slot.
    ///
    /// On success the caller may perform the (possibly blocking) enqueue
    /// outside any lock; the reservation guarantees a consumer will wait for
    /// the item. A failed enqueue must hand the reservation back through
    /// [`release_many`](Self::release_many).
    pub fn request_accept(&self) -> Result<(), AcceptError> {
        let mut state = self.inner.lock();
        if !state.phase.is_running() {
            return Err(AcceptError);
        }
        state.reservations += 1;
        Ok(())
    }

    /// Settles one reservation after the matching item has been consumed.
    pub fn complete_one(&self) {
        let mut state = self.inner.lock();
        debug_assert!(
            state.reservations > 0,
            "complete_one without a matching accept"
        );
        state.reservations = state.reservations.saturating_sub(1);
    }

    /// Hands back `n` reservations whose items will never be consumed:
    /// failed enqueues, or items discarded by an abrupt stop.
    pub fn release_many(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut state = self.inner.lock();
        debug_assert!(
            state.reservations >= n,
            "released more reservations than were accepted"
        );
        state.reservations = state.reservations.saturating_sub(n);
    }

    /// Moves the phase to shutdown-requested, returning whether this call
    /// made the transition. Idempotent.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.inner.lock();
        state.phase.advance(ShutdownPhase::ShutdownRequested)
    }

    /// Whether the drain is finished: shutdown has been requested, nothing
    /// is queued, and no producer still holds a reservation.
    ///
    /// `queue_len` is sampled by the caller; the check is conservative in
    /// the caller's favor because reservations are taken before items reach
    /// the queue and settled only after they leave it.
    pub fn is_quiesced(&self, queue_len: usize) -> bool {
        let state = self.inner.lock();
        !state.phase.is_running() && state.reservations == 0 && queue_len == 0
    }

    /// Marks the service terminated and wakes every waiter, returning
    /// whether this call made the transition.
    ///
    /// Unconditional on purpose: the consumer calls this on its way out on
    /// every exit path, including a panic, so waiters are never stranded.
    pub fn finalize(&self) -> bool {
        let mut state = self.inner.lock();
        let transitioned = state.phase.advance(ShutdownPhase::Terminated);
        if transitioned {
            self.terminated.notify_all();
        }
        transitioned
    }

    /// Blocks until the service has terminated or the timeout elapses.
    /// Returns true if it terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Deadline::after(timeout);
        let mut state = self.inner.lock();
        while !state.phase.is_terminated() {
            match deadline.remaining() {
                None => self.terminated.wait(&mut state),
                Some(rem) if rem.is_zero() => return false,
                Some(rem) => {
                    let _ = self.terminated.wait_for(&mut state, rem);
                }
            }
        }
        true
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.inner.lock().phase
    }

    /// Reservations currently outstanding. A racy snapshot for logs.
    pub fn reservations(&self) -> usize {
        self.inner.lock().reservations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_accept_reserves_and_complete_settles() {
        let coord = ShutdownCoordinator::new();
        coord.request_accept().unwrap();
        coord.request_accept().unwrap();
        assert_eq!(coord.reservations(), 2);

        coord.complete_one();
        assert_eq!(coord.reservations(), 1);
        coord.release_many(1);
        assert_eq!(coord.reservations(), 0);
    }

    #[test]
    fn test_accept_rejected_after_shutdown() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.begin_shutdown());
        assert_eq!(coord.request_accept(), Err(AcceptError));
        assert_eq!(coord.reservations(), 0);
    }

    #[test]
    fn test_begin_shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.begin_shutdown());
        assert!(!coord.begin_shutdown());
        assert!(coord.phase().is_shutdown_requested());
    }

    #[test]
    fn test_quiescence_needs_phase_queue_and_reservations() {
        let coord = ShutdownCoordinator::new();
        // Still running.
        assert!(!coord.is_quiesced(0));

        coord.request_accept().unwrap();
        coord.begin_shutdown();
        // Reservation outstanding.
        assert!(!coord.is_quiesced(0));

        coord.complete_one();
        // Queue still holds an item.
        assert!(!coord.is_quiesced(1));

        assert!(coord.is_quiesced(0));
    }

    #[test]
    fn test_finalize_wakes_waiter() {
        let coord = Arc::new(ShutdownCoordinator::new());
        let waiter_coord = coord.clone();
        let waiter =
            thread::spawn(move || waiter_coord.await_termination(Duration::from_secs(5)));

        // Give the waiter a moment to block.
        thread::sleep(Duration::from_millis(20));
        assert!(coord.finalize());
        assert!(waiter.join().unwrap());
        assert!(coord.phase().is_terminated());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.finalize());
        assert!(!coord.finalize());
    }

    #[test]
    fn test_finalize_skips_shutdown_requested_when_never_asked() {
        // A consumer dying unexpectedly finalizes straight from running.
        let coord = ShutdownCoordinator::new();
        assert!(coord.finalize());
        assert!(coord.phase().is_terminated());
    }

    #[test]
    fn test_await_termination_times_out() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.await_termination(Duration::from_millis(20)));

        coord.begin_shutdown();
        assert!(!coord.await_termination(Duration::from_millis(20)));
    }

    #[test]
    fn test_accept_after_finalize_rejected() {
        let coord = ShutdownCoordinator::new();
        coord.finalize();
        assert!(coord.request_accept().is_err());
    }
}
