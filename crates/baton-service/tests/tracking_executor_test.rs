use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use baton_core::{Executor, Job, TaskId};
use baton_service::{TrackingError, TrackingExecutor};
use baton_worker::{PoolConfig, SpawnPlacement, StealPool};
use rand::Rng;

const TERMINATION_BUDGET: Duration = Duration::from_secs(10);

fn tracked_pool(workers: usize) -> TrackingExecutor<StealPool> {
    let pool = StealPool::start(PoolConfig {
        workers,
        placement: SpawnPlacement::LocalHead,
        park_timeout: Duration::from_millis(5),
        ..PoolConfig::default()
    })
    .unwrap();
    TrackingExecutor::new(pool)
}

#[test]
fn test_abrupt_stop_never_loses_an_incomplete_job() {
    // Jobs mark completion as their very last instruction. After an abrupt
    // stop cuts the run mid-drain, every job whose mark is missing must be
    // in the cancelled set. The reverse does not hold: a job that finished
    // right as shutdown hit may be listed anyway.
    let tracker = tracked_pool(4);
    let completed: Arc<Vec<AtomicBool>> = Arc::new((0..200).map(|_| AtomicBool::new(false)).collect());
    let mut ids: Vec<TaskId> = Vec::with_capacity(200);

    for index in 0..200 {
        let completed = completed.clone();
        let job = Job::new(move |ctx| {
            let pause = rand::rng().random_range(0..3);
            thread::sleep(Duration::from_millis(pause));
            if ctx.is_cancelled() {
                return;
            }
            completed[index].store(true, Ordering::SeqCst);
        });
        ids.push(job.id());
        tracker.execute(job).unwrap();
    }

    thread::sleep(Duration::from_millis(20));
    let returned = tracker.shutdown_now();
    assert!(tracker.await_terminated(TERMINATION_BUDGET));

    let cancelled: HashSet<TaskId> = tracker.cancelled_tasks().unwrap().into_iter().collect();
    for job in &returned {
        assert!(cancelled.contains(&job.id()), "returned job missing from set");
    }
    for (index, flag) in completed.iter().enumerate() {
        if !flag.load(Ordering::SeqCst) {
            assert!(
                cancelled.contains(&ids[index]),
                "incomplete job {index} missing from set"
            );
        }
    }
}

#[test]
fn test_unstarted_backlog_is_recorded() {
    let tracker = tracked_pool(1);

    // The only worker is parked inside a gated job while a backlog builds.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    tracker
        .execute(Job::new(move |_ctx| {
            let _ = gate_rx.recv();
        }))
        .unwrap();
    let backlog_ids: Vec<TaskId> = (0..5)
        .map(|_| {
            let job = Job::new(|_ctx| {});
            let id = job.id();
            tracker.execute(job).unwrap();
            id
        })
        .collect();
    thread::sleep(Duration::from_millis(30));

    let returned = tracker.shutdown_now();
    gate_tx.send(()).ok();
    assert!(tracker.await_terminated(TERMINATION_BUDGET));

    let cancelled: HashSet<TaskId> = tracker.cancelled_tasks().unwrap().into_iter().collect();
    for id in &backlog_ids {
        assert!(cancelled.contains(id));
    }
    assert!(returned.len() >= 5);
}

#[test]
fn test_results_unavailable_until_pool_terminates() {
    let tracker = tracked_pool(2);
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    tracker
        .execute(Job::new(move |_ctx| {
            let _ = gate_rx.recv();
        }))
        .unwrap();

    assert_eq!(
        tracker.cancelled_tasks(),
        Err(TrackingError::ExecutorStillRunning)
    );

    tracker.shutdown();
    gate_tx.send(()).unwrap();
    assert!(tracker.await_terminated(TERMINATION_BUDGET));

    // A graceful drain interrupts nothing.
    assert!(tracker.cancelled_tasks().unwrap().is_empty());
}

#[test]
fn test_graceful_drain_over_pool_records_nothing() {
    let tracker = tracked_pool(4);
    for _ in 0..80 {
        tracker
            .execute(Job::new(|_ctx| {
                thread::sleep(Duration::from_micros(100));
            }))
            .unwrap();
    }
    tracker.shutdown();
    assert!(tracker.await_terminated(TERMINATION_BUDGET));
    assert!(tracker.cancelled_tasks().unwrap().is_empty());
}
