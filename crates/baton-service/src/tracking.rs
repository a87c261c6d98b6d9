//! Best-effort cancellation bookkeeping around an executor.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use baton_core::{CancelToken, Executor, Job, RejectedJob, TaskId};
use parking_lot::Mutex;

use crate::error::TrackingError;

/// Executor wrapper that records which jobs an abrupt shutdown may have
/// interrupted.
///
/// Every job is adapted with a probe that runs when the body ends, on every
/// exit path: normal return, early return after observing cancellation, or
/// panic. The probe records the job's id when shutdown has been requested
/// and the running worker's cancellation token is set. Jobs handed back
/// unstarted by [`shutdown_now`](Executor::shutdown_now) are recorded too.
///
/// The record is one-sided. A job that raced shutdown and actually finished
/// its last instruction before the probe ran can still be listed, so false
/// positives happen; a job that did not complete is never missing. Callers
/// can therefore not tell a recorded finisher from a genuine casualty, and
/// jobs used with this wrapper must be safe to run again.
pub struct TrackingExecutor<E> {
    inner: E,
    state: Arc<TrackState>,
}

struct TrackState {
    shutdown: AtomicBool,
    cancelled: Mutex<HashSet<TaskId>>,
}

impl<E: Executor> TrackingExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            state: Arc::new(TrackState {
                shutdown: AtomicBool::new(false),
                cancelled: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// The wrapped executor.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Ids of the jobs that may not have completed.
    ///
    /// Available only after the wrapped executor has terminated; before
    /// that the set can still grow and a snapshot would be misleading. Once
    /// terminated the set is stable across calls.
    pub fn cancelled_tasks(&self) -> Result<Vec<TaskId>, TrackingError> {
        if !self.inner.is_terminated() {
            return Err(TrackingError::ExecutorStillRunning);
        }
        Ok(self.state.cancelled.lock().iter().copied().collect())
    }
}

impl<E: Executor> Executor for TrackingExecutor<E> {
    fn execute(&self, job: Job) -> Result<(), RejectedJob> {
        let state = self.state.clone();
        let id = job.id();
        let probed = Job::with_id(id, move |ctx| {
            // Dropped when the body ends, including by unwinding.
            let _probe = CancellationProbe {
                state,
                id,
                token: ctx.cancel_token().clone(),
            };
            job.run(ctx);
        });
        self.inner.execute(probed)
    }

    fn shutdown(&self) {
        // A cancellation observed any time after this point is recordable;
        // jobs cut short during the drain count as casualties too.
        self.state.shutdown.store(true, Ordering::SeqCst);
        self.inner.shutdown();
    }

    fn shutdown_now(&self) -> Vec<Job> {
        // The flag goes up before workers see their tokens cancelled, so a
        // probe that observes a set token also observes the flag.
        self.state.shutdown.store(true, Ordering::SeqCst);
        let unstarted = self.inner.shutdown_now();
        {
            let mut cancelled = self.state.cancelled.lock();
            for job in &unstarted {
                cancelled.insert(job.id());
            }
        }
        if !unstarted.is_empty() {
            tracing::warn!(
                unstarted = unstarted.len(),
                "abrupt shutdown; unstarted jobs recorded as cancelled"
            );
        }
        unstarted
    }

    fn await_terminated(&self, timeout: Duration) -> bool {
        self.inner.await_terminated(timeout)
    }

    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

/// Runs when a job body ends on a worker, whatever the exit path.
struct CancellationProbe {
    state: Arc<TrackState>,
    id: TaskId,
    token: CancelToken,
}

impl Drop for CancellationProbe {
    fn drop(&mut self) {
        // Query without clearing; the signal still belongs to the worker.
        if self.state.shutdown.load(Ordering::SeqCst) && self.token.is_cancelled() {
            self.state.cancelled.lock().insert(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::DirectExecutor;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_delegates_execution() {
        let tracker = TrackingExecutor::new(DirectExecutor::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tracker
            .execute(Job::new(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_tasks_gated_until_terminated() {
        let tracker = TrackingExecutor::new(DirectExecutor::new());
        assert_eq!(
            tracker.cancelled_tasks(),
            Err(TrackingError::ExecutorStillRunning)
        );

        tracker.shutdown();
        assert!(tracker.await_terminated(Duration::from_secs(1)));
        assert_eq!(tracker.cancelled_tasks(), Ok(Vec::new()));
    }

    #[test]
    fn test_graceful_shutdown_records_nothing() {
        let tracker = TrackingExecutor::new(DirectExecutor::new());
        for _ in 0..10 {
            tracker.execute(Job::new(|_ctx| {})).unwrap();
        }
        tracker.shutdown();
        assert!(tracker.await_terminated(Duration::from_secs(1)));
        assert!(tracker.cancelled_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_job_interrupted_by_abrupt_shutdown_is_recorded() {
        let tracker = Arc::new(TrackingExecutor::new(DirectExecutor::new()));
        let handle = tracker.clone();
        let job = Job::new(move |ctx| {
            handle.shutdown_now();
            // The body gives up without finishing its work.
            assert!(ctx.is_cancelled());
        });
        let id = job.id();
        tracker.execute(job).unwrap();

        assert!(tracker.is_terminated());
        assert_eq!(tracker.cancelled_tasks().unwrap(), vec![id]);
    }

    #[test]
    fn test_job_cancelled_outside_shutdown_is_not_recorded() {
        // A host cancelling the worker token directly is not a shutdown;
        // the set only grows during the shutdown window.
        let executor = DirectExecutor::new();
        let token = executor.cancel_token().clone();
        let tracker = TrackingExecutor::new(executor);
        tracker
            .execute(Job::new(move |_ctx| {
                token.cancel();
            }))
            .unwrap();

        tracker.inner().cancel_token().clear();
        tracker.shutdown();
        assert!(tracker.await_terminated(Duration::from_secs(1)));
        assert!(tracker.cancelled_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_execute_after_shutdown_rejected_with_identity() {
        let tracker = TrackingExecutor::new(DirectExecutor::new());
        tracker.shutdown();

        let job = Job::new(|_ctx| {});
        let id = job.id();
        let err = tracker.execute(job).unwrap_err();
        assert_eq!(err.id(), id);
    }

    #[test]
    fn test_panicking_job_during_shutdown_is_recorded() {
        let tracker = Arc::new(TrackingExecutor::new(DirectExecutor::new()));
        let handle = tracker.clone();
        let job = Job::new(move |_ctx| {
            handle.shutdown_now();
            panic!("job gave up");
        });
        let id = job.id();
        // The inline executor propagates the panic to the submitting thread.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = tracker.execute(job);
        }));

        assert!(outcome.is_err());
        assert!(tracker.is_terminated());
        assert_eq!(tracker.cancelled_tasks().unwrap(), vec![id]);
    }
}
