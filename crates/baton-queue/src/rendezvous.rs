//! Zero-capacity synchronous handoff.

use std::time::Duration;

use baton_core::{CancelToken, Deadline};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{PutError, TakeError};
use crate::queue::BlockingQueue;
use crate::wait::{wait_step, WaitStep};

/// Queue with no storage: every `put` pairs with exactly one `take`.
///
/// A putter deposits its item in a single transfer slot and keeps waiting
/// until a taker picks it up; `put` returning `Ok` means the item changed
/// hands. A putter whose token fires mid-handoff retracts its own deposit, so
/// cancellation never strands an item. `len()` is always zero and
/// `capacity()` is `Some(0)`.
///
/// `try_put` succeeds only when a taker is already waiting. If that taker is
/// itself cancelled before pickup, the deposit stays offered until the next
/// `take` or `drain`; that window is the one place an item can outlive its
/// `try_put` call.
pub struct RendezvousQueue<T> {
    inner: Mutex<Slot<T>>,
    cv: Condvar,
}

struct Slot<T> {
    item: Option<T>,
    // Bumped on every deposit so a putter can tell "my item was taken" from
    // "my item was taken and someone else deposited".
    generation: u64,
    takers_waiting: usize,
    closed: bool,
}

impl<T> RendezvousQueue<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slot {
                item: None,
                generation: 0,
                takers_waiting: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn deposit(slot: &mut Slot<T>, item: T) -> u64 {
        slot.item = Some(item);
        slot.generation += 1;
        slot.generation
    }

    fn put_deadline(
        &self,
        item: T,
        deadline: Deadline,
        token: &CancelToken,
    ) -> Result<(), PutError<T>> {
        let mut slot = self.inner.lock();

        // Wait for the transfer slot to be free.
        loop {
            if token.is_cancelled() {
                return Err(PutError::Cancelled(item));
            }
            if slot.closed {
                return Err(PutError::Closed(item));
            }
            if slot.item.is_none() {
                break;
            }
            match wait_step(&self.cv, &mut slot, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(PutError::Full(item)),
            }
        }

        // Deposit, then wait for a taker to pick it up. The slot lock is
        // held at every check, so "generation matches and the slot is
        // occupied" always means the deposit is still ours to reclaim.
        let my_generation = Self::deposit(&mut slot, item);
        self.cv.notify_all();
        loop {
            if slot.generation != my_generation {
                return Ok(());
            }
            let item = match slot.item.take() {
                Some(item) => item,
                None => return Ok(()),
            };
            if token.is_cancelled() {
                self.cv.notify_all();
                return Err(PutError::Cancelled(item));
            }
            if slot.closed {
                self.cv.notify_all();
                return Err(PutError::Closed(item));
            }
            if deadline.expired() {
                self.cv.notify_all();
                return Err(PutError::Full(item));
            }
            slot.item = Some(item);
            let _ = wait_step(&self.cv, &mut slot, &deadline);
        }
    }

    fn take_deadline(&self, deadline: Deadline, token: &CancelToken) -> Result<T, TakeError> {
        let mut slot = self.inner.lock();
        slot.takers_waiting += 1;
        let result = self.take_locked(&mut slot, deadline, token);
        slot.takers_waiting -= 1;
        result
    }

    fn take_locked(
        &self,
        slot: &mut MutexGuard<'_, Slot<T>>,
        deadline: Deadline,
        token: &CancelToken,
    ) -> Result<T, TakeError> {
        loop {
            if token.is_cancelled() {
                return Err(TakeError::Cancelled);
            }
            if let Some(item) = slot.item.take() {
                // Wakes the putter waiting for pickup confirmation.
                self.cv.notify_all();
                return Ok(item);
            }
            if slot.closed {
                return Err(TakeError::Closed);
            }
            match wait_step(&self.cv, slot, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(TakeError::Empty),
            }
        }
    }
}

impl<T: Send> BlockingQueue<T> for RendezvousQueue<T> {
    fn put(&self, item: T, token: &CancelToken) -> Result<(), PutError<T>> {
        self.put_deadline(item, Deadline::never(), token)
    }

    fn put_timeout(
        &self,
        item: T,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<(), PutError<T>> {
        self.put_deadline(item, Deadline::after(timeout), token)
    }

    fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        let mut slot = self.inner.lock();
        if slot.closed {
            return Err(PutError::Closed(item));
        }
        if slot.takers_waiting == 0 || slot.item.is_some() {
            return Err(PutError::Full(item));
        }
        Self::deposit(&mut slot, item);
        self.cv.notify_all();
        Ok(())
    }

    fn take(&self, token: &CancelToken) -> Result<T, TakeError> {
        self.take_deadline(Deadline::never(), token)
    }

    fn take_timeout(&self, timeout: Duration, token: &CancelToken) -> Result<T, TakeError> {
        self.take_deadline(Deadline::after(timeout), token)
    }

    fn try_take(&self) -> Result<T, TakeError> {
        let mut slot = self.inner.lock();
        match slot.item.take() {
            Some(item) => {
                self.cv.notify_all();
                Ok(item)
            }
            None if slot.closed => Err(TakeError::Closed),
            None => Err(TakeError::Empty),
        }
    }

    /// Always zero: the transfer slot is handoff state, not storage.
    fn len(&self) -> usize {
        0
    }

    fn capacity(&self) -> Option<usize> {
        Some(0)
    }

    fn close(&self) {
        let mut slot = self.inner.lock();
        if !slot.closed {
            slot.closed = true;
            self.cv.notify_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns the mid-handoff item if one is deposited, so an abrupt
    /// shutdown cannot lose an accepted transfer.
    fn drain(&self) -> Vec<T> {
        let mut slot = self.inner.lock();
        match slot.item.take() {
            Some(item) => {
                self.cv.notify_all();
                vec![item]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn test_len_is_always_zero() {
        let queue: RendezvousQueue<u32> = RendezvousQueue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), Some(0));
    }

    #[test]
    fn test_try_put_without_taker_is_full() {
        let queue = RendezvousQueue::new();
        let err = queue.try_put(1).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_item(), 1);
    }

    #[test]
    fn test_try_take_without_putter_is_empty() {
        let queue: RendezvousQueue<u32> = RendezvousQueue::new();
        assert_eq!(queue.try_take().unwrap_err(), TakeError::Empty);
    }

    #[test]
    fn test_put_timeout_without_taker_returns_item() {
        let queue = RendezvousQueue::new();
        let err = queue
            .put_timeout(9, Duration::from_millis(30), &token())
            .unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_item(), 9);
        // Nothing stranded in the slot.
        assert_eq!(queue.try_take().unwrap_err(), TakeError::Empty);
    }

    #[test]
    fn test_cancelled_put_retracts_deposit() {
        let queue = RendezvousQueue::new();
        let cancel = token();
        cancel.cancel();

        let err = queue.put(4, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.into_item(), 4);
        assert!(cancel.is_cancelled());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_close_fails_both_sides_when_idle() {
        let queue: RendezvousQueue<u32> = RendezvousQueue::new();
        queue.close();
        assert!(queue.put(1, &token()).unwrap_err().is_closed());
        assert_eq!(queue.try_take().unwrap_err(), TakeError::Closed);
    }
}
