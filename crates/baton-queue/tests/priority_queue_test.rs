use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use baton_core::CancelToken;
use baton_queue::{BlockingQueue, PriorityQueue};

fn token() -> CancelToken {
    CancelToken::new()
}

/// With concurrent producers, a sequential drain still comes out in
/// non-increasing priority order.
#[test]
fn test_concurrent_inserts_deliver_highest_first() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u32 = 200;

    let queue = Arc::new(PriorityQueue::unbounded());
    let start = Arc::new(Barrier::new(PRODUCERS));

    let producers: Vec<_> = (0..PRODUCERS as u32)
        .map(|p| {
            let queue = queue.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                for n in 0..PER_PRODUCER {
                    queue.put((n + p) % 10, &token()).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut previous = u32::MAX;
    for _ in 0..PRODUCERS as u32 * PER_PRODUCER {
        let item = queue.take(&token()).unwrap();
        assert!(item <= previous, "{item} delivered after {previous}");
        previous = item;
    }
    assert!(queue.is_empty());
}

/// A blocked put on a bounded priority queue completes once a take frees
/// space.
#[test]
fn test_blocked_put_completes_after_take() {
    let queue = Arc::new(PriorityQueue::bounded(1));
    queue.put(1u32, &token()).unwrap();

    let putter = {
        let queue = queue.clone();
        thread::spawn(move || queue.put(9, &token()))
    };

    thread::sleep(Duration::from_millis(100));
    assert_eq!(queue.take(&token()).unwrap(), 1);
    putter.join().unwrap().unwrap();
    assert_eq!(queue.take(&token()).unwrap(), 9);
}

/// A waiting taker is woken by an insert and receives it.
#[test]
fn test_blocked_take_woken_by_put() {
    let queue: Arc<PriorityQueue<u32>> = Arc::new(PriorityQueue::unbounded());

    let taker = {
        let queue = queue.clone();
        thread::spawn(move || queue.take(&token()).unwrap())
    };

    thread::sleep(Duration::from_millis(50));
    queue.put(42, &token()).unwrap();
    assert_eq!(taker.join().unwrap(), 42);
}
