//! The consumer-side output boundary.

use anyhow::Result;

/// Receiver of dequeued items, owned by the consumer thread.
///
/// Ownership of each item transfers from producer to consumer at the moment
/// of dequeue; the sink is where the consumer hands items to host code. The
/// sink value moves into the consumer thread at service start and never
/// leaves it, so implementations need `Send` but not `Sync`.
///
/// An error from [`accept`](Sink::accept) is a host failure, not a service
/// failure: the service logs it, drops that item, and keeps consuming.
///
/// Any closure `FnMut(T) -> anyhow::Result<()> + Send` is a sink.
pub trait Sink<T>: Send {
    /// Consumes one dequeued item.
    fn accept(&mut self, item: T) -> Result<()>;

    /// Final flush before the consumer exits. Called once, on orderly exits
    /// only; release resources in `Drop` to also cover a panicking consumer.
    fn close(&mut self) {}
}

impl<T, F> Sink<T> for F
where
    F: FnMut(T) -> Result<()> + Send,
{
    fn accept(&mut self, item: T) -> Result<()> {
        self(item)
    }
}
