//! Per-worker double-ended job queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Double-ended queue with one owning worker and any number of thieves.
///
/// The owner works the head: [`push`](Self::push) and [`pop`](Self::pop)
/// make freshly spawned work run next, newest first. Everyone else touches
/// only the tail: [`steal`](Self::steal) removes the oldest item and
/// [`push_tail`](Self::push_tail) appends external submissions, so the
/// owner drains them in arrival order.
///
/// All operations are lock-protected and safe from any thread; the
/// owner/thief distinction is a usage convention, not a type-level rule.
pub struct WorkerDeque<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> WorkerDeque<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Owner push: `item` becomes the next [`pop`](Self::pop) result.
    pub fn push(&self, item: T) {
        self.inner.lock().push_front(item);
    }

    /// Owner pop from the head, newest first.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Removes the oldest item from the tail.
    ///
    /// Never waits: an empty deque or a lock held by anyone else at this
    /// instant is a miss. A thief treats a miss as "try the next victim".
    pub fn steal(&self) -> Option<T> {
        self.inner.try_lock().and_then(|mut items| items.pop_back())
    }

    /// Appends to the tail without claiming ownership.
    pub fn push_tail(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Removes and returns everything, head end first.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }
}

impl<T> Default for WorkerDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_pops_newest_first() {
        let deque = WorkerDeque::new();
        deque.push(1);
        deque.push(2);
        deque.push(3);

        assert_eq!(deque.pop(), Some(3));
        assert_eq!(deque.pop(), Some(2));
        assert_eq!(deque.pop(), Some(1));
        assert_eq!(deque.pop(), None);
    }

    #[test]
    fn test_thief_steals_oldest() {
        let deque = WorkerDeque::new();
        deque.push(1);
        deque.push(2);
        deque.push(3);

        assert_eq!(deque.steal(), Some(1));
        assert_eq!(deque.steal(), Some(2));
        // Owner and thief drain opposite ends without overlap.
        assert_eq!(deque.pop(), Some(3));
        assert_eq!(deque.steal(), None);
    }

    #[test]
    fn test_tail_submissions_reach_owner_in_arrival_order() {
        let deque = WorkerDeque::new();
        deque.push_tail("a");
        deque.push_tail("b");
        deque.push_tail("c");

        assert_eq!(deque.pop(), Some("a"));
        assert_eq!(deque.pop(), Some("b"));
        assert_eq!(deque.pop(), Some("c"));
    }

    #[test]
    fn test_owner_head_wins_over_tail_backlog() {
        let deque = WorkerDeque::new();
        deque.push_tail(10);
        deque.push_tail(11);
        deque.push(99);

        assert_eq!(deque.pop(), Some(99));
        assert_eq!(deque.pop(), Some(10));
    }

    #[test]
    fn test_steal_on_empty_is_a_miss() {
        let deque = WorkerDeque::<u32>::new();
        assert_eq!(deque.steal(), None);
        assert!(deque.is_empty());
    }

    #[test]
    fn test_drain_returns_head_end_first() {
        let deque = WorkerDeque::new();
        deque.push(1);
        deque.push(2);
        deque.push_tail(9);

        assert_eq!(deque.drain(), vec![2, 1, 9]);
        assert_eq!(deque.len(), 0);
    }
}
