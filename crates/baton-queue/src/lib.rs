//! Baton Queue Library
//!
//! Blocking producer-consumer queues with cooperative cancellation: a FIFO
//! queue (bounded or unbounded), a priority queue with a stable tie-break, a
//! zero-capacity rendezvous queue, and a poison-pill channel for sentinel
//! based consumer termination.
//!
//! Every blocking operation takes a [`CancelToken`](baton_core::CancelToken)
//! and aborts with a `Cancelled` error when the token fires, leaving both the
//! queue state and the token untouched so outer code sees the signal too.

pub mod bounded;
pub mod error;
pub mod poison;
pub mod priority;
pub mod queue;
pub mod rendezvous;

mod wait;

// Re-export commonly used types
pub use bounded::BoundedQueue;
pub use error::{PutError, TakeError};
pub use poison::{pill_channel, PillReceiver, PillSendError, PillSender};
pub use priority::PriorityQueue;
pub use queue::BlockingQueue;
pub use rendezvous::RendezvousQueue;
