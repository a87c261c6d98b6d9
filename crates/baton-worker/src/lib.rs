//! Baton Worker Library
//!
//! Decentralized work-stealing execution: a per-worker double-ended queue
//! whose owner works the head while idle peers steal from the tail, and a
//! fixed pool of such workers behind the executor seam with graceful and
//! abrupt shutdown.

pub mod deque;
pub mod pool;

// Re-export commonly used types
pub use deque::WorkerDeque;
pub use pool::{PoolConfig, PoolError, SpawnPlacement, StealPool};
