//! Sentinel-based consumer termination.
//!
//! A pill channel wraps an unbounded FIFO in a sender/receiver pair that
//! handles the end-of-stream sentinels itself: user data can never collide
//! with a pill because the sentinel lives in a private envelope type, and a
//! receiver never surfaces one as data.
//!
//! Sentinel termination only composes with unbounded (or comfortably large)
//! queues: on a bounded queue under pressure a pill can be stuck behind a
//! full buffer, and on a priority queue it can be reordered past data. This
//! module therefore always builds on an unbounded FIFO and offers no bounded
//! constructor; bounded deployments need a coordinator-driven shutdown as
//! well.

use std::sync::Arc;

use baton_core::CancelToken;
use thiserror::Error;

use crate::bounded::BoundedQueue;
use crate::error::TakeError;
use crate::queue::BlockingQueue;

enum Envelope<T> {
    Payload(T),
    Pill,
}

/// Error from [`PillSender::send`].
#[derive(Error)]
pub enum PillSendError<T> {
    /// The sender already delivered its pills; no further enqueues are
    /// allowed after that.
    #[error("pill sender already finished")]
    Finished(T),
}

impl<T> PillSendError<T> {
    /// Returns the item that was not sent.
    pub fn into_item(self) -> T {
        match self {
            PillSendError::Finished(item) => item,
        }
    }
}

impl<T> std::fmt::Debug for PillSendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PillSendError::Finished(_) => f.write_str("Finished(..)"),
        }
    }
}

/// Producer handle for a pill channel.
///
/// Send items with [`send`](Self::send); call [`finish`](Self::finish) once
/// production is done. Dropping an unfinished sender finishes it, so a
/// producer thread that unwinds still releases its consumers.
pub struct PillSender<T: Send> {
    queue: Arc<BoundedQueue<Envelope<T>>>,
    pills_to_send: usize,
    finished: bool,
}

impl<T: Send> PillSender<T> {
    pub fn send(&mut self, item: T) -> Result<(), PillSendError<T>> {
        if self.finished {
            return Err(PillSendError::Finished(item));
        }
        self.push(Envelope::Payload(item));
        Ok(())
    }

    /// Marks production complete and enqueues one pill per consumer.
    /// Idempotent; also run by `Drop`.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for _ in 0..self.pills_to_send {
            self.push(Envelope::Pill);
        }
        tracing::debug!(pills = self.pills_to_send, "pill sender finished");
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn push(&self, envelope: Envelope<T>) {
        // The channel queue is unbounded and never closed, so the enqueue
        // cannot be refused.
        if self.queue.try_put(envelope).is_err() {
            tracing::error!("pill channel refused an enqueue");
        }
    }
}

impl<T: Send> Drop for PillSender<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Consumer handle for a pill channel.
///
/// [`recv`](Self::recv) yields `Ok(Some(item))` per data item and `Ok(None)`
/// once this receiver has seen one pill from every producer; pills are
/// consumed internally and never surfaced.
pub struct PillReceiver<T: Send> {
    queue: Arc<BoundedQueue<Envelope<T>>>,
    pills_seen: usize,
    pills_expected: usize,
}

impl<T: Send> PillReceiver<T> {
    /// Blocks for the next data item. `Ok(None)` is end of stream; the only
    /// reachable error is `TakeError::Cancelled`.
    pub fn recv(&mut self, token: &CancelToken) -> Result<Option<T>, TakeError> {
        loop {
            if self.is_finished() {
                return Ok(None);
            }
            match self.queue.take(token)? {
                Envelope::Payload(item) => return Ok(Some(item)),
                Envelope::Pill => self.swallow_pill(),
            }
        }
    }

    /// Bounded-wait variant of [`recv`](Self::recv); `TakeError::Empty`
    /// means the timeout elapsed with the stream still open.
    pub fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
        token: &CancelToken,
    ) -> Result<Option<T>, TakeError> {
        loop {
            if self.is_finished() {
                return Ok(None);
            }
            match self.queue.take_timeout(timeout, token)? {
                Envelope::Payload(item) => return Ok(Some(item)),
                Envelope::Pill => self.swallow_pill(),
            }
        }
    }

    /// True once this receiver has collected a pill from every producer.
    pub fn is_finished(&self) -> bool {
        self.pills_seen >= self.pills_expected
    }

    fn swallow_pill(&mut self) {
        self.pills_seen += 1;
        if self.is_finished() {
            tracing::debug!(pills = self.pills_seen, "pill receiver finished");
        }
    }
}

/// Builds a pill channel for `producers` senders and `consumers` receivers.
///
/// Every sender delivers `consumers` pills when it finishes, and every
/// receiver stops after collecting `producers` pills, so each receiver
/// observes exactly one termination signal per producer and all pills are
/// accounted for.
///
/// # Panics
///
/// Panics if `producers` or `consumers` is zero.
pub fn pill_channel<T: Send>(
    producers: usize,
    consumers: usize,
) -> (Vec<PillSender<T>>, Vec<PillReceiver<T>>) {
    assert!(producers > 0, "a pill channel needs at least one producer");
    assert!(consumers > 0, "a pill channel needs at least one consumer");

    let queue = Arc::new(BoundedQueue::unbounded());
    let senders = (0..producers)
        .map(|_| PillSender {
            queue: queue.clone(),
            pills_to_send: consumers,
            finished: false,
        })
        .collect();
    let receivers = (0..consumers)
        .map(|_| PillReceiver {
            queue: queue.clone(),
            pills_seen: 0,
            pills_expected: producers,
        })
        .collect();
    (senders, receivers)
}
