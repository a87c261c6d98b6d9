//! FIFO blocking queue, bounded or unbounded.

use std::collections::VecDeque;
use std::time::Duration;

use baton_core::{CancelToken, Deadline};
use parking_lot::{Condvar, Mutex};

use crate::error::{PutError, TakeError};
use crate::queue::BlockingQueue;
use crate::wait::{wait_step, WaitStep};

/// FIFO queue with blocking handoff and an optional capacity bound.
///
/// Delivery order is global insertion order: whatever thread enqueued first
/// is dequeued first, regardless of which producer or consumer is involved.
/// The size invariant `0 <= len <= capacity` holds at every instant.
pub struct BoundedQueue<T> {
    inner: Mutex<Buf<T>>,
    // One condvar shared by producers and consumers, always notified with
    // notify_all: a cancelled waiter that absorbs a targeted wakeup would
    // otherwise strand the peer it was meant for.
    cv: Condvar,
    capacity: Option<usize>,
}

struct Buf<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. A zero-capacity handoff is a different
    /// structure; use [`RendezvousQueue`](crate::RendezvousQueue).
    pub fn bounded(capacity: usize) -> Self {
        assert!(
            capacity > 0,
            "capacity 0 is a rendezvous handoff; use RendezvousQueue"
        );
        Self::with_capacity(Some(capacity))
    }

    /// Queue with no capacity bound; `put` never waits.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Buf {
                items: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    fn has_room(&self, buf: &Buf<T>) -> bool {
        match self.capacity {
            Some(capacity) => buf.items.len() < capacity,
            None => true,
        }
    }

    fn put_deadline(
        &self,
        item: T,
        deadline: Deadline,
        token: &CancelToken,
    ) -> Result<(), PutError<T>> {
        let mut buf = self.inner.lock();
        loop {
            if token.is_cancelled() {
                return Err(PutError::Cancelled(item));
            }
            if buf.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&buf) {
                break;
            }
            match wait_step(&self.cv, &mut buf, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(PutError::Full(item)),
            }
        }
        buf.items.push_back(item);
        self.cv.notify_all();
        Ok(())
    }

    fn take_deadline(&self, deadline: Deadline, token: &CancelToken) -> Result<T, TakeError> {
        let mut buf = self.inner.lock();
        loop {
            if token.is_cancelled() {
                return Err(TakeError::Cancelled);
            }
            if let Some(item) = buf.items.pop_front() {
                self.cv.notify_all();
                return Ok(item);
            }
            // Buffered items are served above even after close.
            if buf.closed {
                return Err(TakeError::Closed);
            }
            match wait_step(&self.cv, &mut buf, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(TakeError::Empty),
            }
        }
    }
}

impl<T: Send> BlockingQueue<T> for BoundedQueue<T> {
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
        let mut buf = self.inner.lock();
        if buf.closed {
            return Err(PutError::Closed(item));
        }
        if !self.has_room(&buf) {
            return Err(PutError::Full(item));
        }
        buf.items.push_back(item);
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
        let mut buf = self.inner.lock();
        match buf.items.pop_front() {
            Some(item) => {
                self.cv.notify_all();
                Ok(item)
            }
            None if buf.closed => Err(TakeError::Closed),
            None => Err(TakeError::Empty),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn close(&self) {
        let mut buf = self.inner.lock();
        if !buf.closed {
            buf.closed = true;
            self.cv.notify_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn drain(&self) -> Vec<T> {
        let mut buf = self.inner.lock();
        let drained: Vec<T> = buf.items.drain(..).collect();
        if !drained.is_empty() {
            self.cv.notify_all();
        }
        drained
    }
}
