//! Priority blocking queue with a stable FIFO tie-break.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use baton_core::{CancelToken, Deadline};
use parking_lot::{Condvar, Mutex};

use crate::error::{PutError, TakeError};
use crate::queue::BlockingQueue;
use crate::wait::{wait_step, WaitStep};

/// Blocking queue delivering the greatest item (per `Ord`) first.
///
/// Equal items are delivered in arrival order: every insert is stamped with a
/// monotonically increasing sequence number, and the earlier stamp wins the
/// tie. The tie-break is part of the contract; callers may rely on it.
pub struct PriorityQueue<T> {
    inner: Mutex<Heap<T>>,
    cv: Condvar,
    capacity: Option<usize>,
}

struct Heap<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
    closed: bool,
}

struct Entry<T> {
    item: T,
    seq: u64,
}

impl<T: Ord> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on the item; reversed on seq so earlier arrivals win ties.
        self.item
            .cmp(&other.item)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T: Ord> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for Entry<T> {}

impl<T: Ord> PriorityQueue<T> {
    /// Queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; a rendezvous handoff has no ordering to
    /// offer, use [`RendezvousQueue`](crate::RendezvousQueue).
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
            inner: Mutex::new(Heap {
                entries: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    fn has_room(&self, heap: &Heap<T>) -> bool {
        match self.capacity {
            Some(capacity) => heap.entries.len() < capacity,
            None => true,
        }
    }

    fn push(&self, heap: &mut Heap<T>, item: T) {
        let seq = heap.next_seq;
        heap.next_seq += 1;
        heap.entries.push(Entry { item, seq });
        self.cv.notify_all();
    }

    fn put_deadline(
        &self,
        item: T,
        deadline: Deadline,
        token: &CancelToken,
    ) -> Result<(), PutError<T>> {
        let mut heap = self.inner.lock();
        loop {
            if token.is_cancelled() {
                return Err(PutError::Cancelled(item));
            }
            if heap.closed {
                return Err(PutError::Closed(item));
            }
            if self.has_room(&heap) {
                break;
            }
            match wait_step(&self.cv, &mut heap, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(PutError::Full(item)),
            }
        }
        self.push(&mut heap, item);
        Ok(())
    }

    fn take_deadline(&self, deadline: Deadline, token: &CancelToken) -> Result<T, TakeError> {
        let mut heap = self.inner.lock();
        loop {
            if token.is_cancelled() {
                return Err(TakeError::Cancelled);
            }
            if let Some(entry) = heap.entries.pop() {
                self.cv.notify_all();
                return Ok(entry.item);
            }
            if heap.closed {
                return Err(TakeError::Closed);
            }
            match wait_step(&self.cv, &mut heap, &deadline) {
                WaitStep::Again => {}
                WaitStep::DeadlineExpired => return Err(TakeError::Empty),
            }
        }
    }
}

impl<T: Ord + Send> BlockingQueue<T> for PriorityQueue<T> {
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
        let mut heap = self.inner.lock();
        if heap.closed {
            return Err(PutError::Closed(item));
        }
        if !self.has_room(&heap) {
            return Err(PutError::Full(item));
        }
        self.push(&mut heap, item);
        Ok(())
    }

    fn take(&self, token: &CancelToken) -> Result<T, TakeError> {
        self.take_deadline(Deadline::never(), token)
    }

    fn take_timeout(&self, timeout: Duration, token: &CancelToken) -> Result<T, TakeError> {
        self.take_deadline(Deadline::after(timeout), token)
    }

    fn try_take(&self) -> Result<T, TakeError> {
        let mut heap = self.inner.lock();
        match heap.entries.pop() {
            Some(entry) => {
                self.cv.notify_all();
                Ok(entry.item)
            }
            None if heap.closed => Err(TakeError::Closed),
            None => Err(TakeError::Empty),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn close(&self) {
        let mut heap = self.inner.lock();
        if !heap.closed {
            heap.closed = true;
            self.cv.notify_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn drain(&self) -> Vec<T> {
        let mut heap = self.inner.lock();
        let entries = std::mem::take(&mut heap.entries);
        if entries.is_empty() {
            return Vec::new();
        }
        self.cv.notify_all();
        // Delivery order: greatest first, ties by arrival.
        let mut sorted = entries.into_sorted_vec();
        sorted.reverse();
        sorted.into_iter().map(|entry| entry.item).collect()
    }
}
