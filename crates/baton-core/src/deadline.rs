//! Wait deadlines for timed blocking operations.
//!
//! Blocking waits in this workspace are written against an absolute deadline
//! rather than a relative timeout, so a wait that wakes up spuriously or to
//! re-check a cancellation token keeps the original time budget.

use std::time::{Duration, Instant};

/// Absolute time budget for a blocking wait. `never()` waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn never() -> Self {
        Self { end: None }
    }

    /// A deadline `timeout` from now. A timeout large enough to overflow the
    /// clock is treated as never expiring.
    pub fn after(timeout: Duration) -> Self {
        Self {
            end: Instant::now().checked_add(timeout),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.end.is_none()
    }

    pub fn expired(&self) -> bool {
        match self.end {
            Some(end) => Instant::now() >= end,
            None => false,
        }
    }

    /// Time left on the budget. `None` means unbounded; `Some(ZERO)` means
    /// the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.end
            .map(|end| end.saturating_duration_since(Instant::now()))
    }
}
