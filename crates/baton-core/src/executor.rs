//! The executor seam shared by thread pools and in-thread runners.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::deadline::Deadline;
use crate::phase::ShutdownPhase;
use crate::task::{Job, Spawn, TaskContext, TaskId};

/// Error returned when an executor refuses new work.
///
/// The rejected job rides along so the caller can persist or resubmit it.
#[derive(Debug, Error)]
#[error("executor is not running; job {} was rejected", .job.id())]
pub struct RejectedJob {
    job: Job,
}

impl RejectedJob {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn id(&self) -> TaskId {
        self.job.id()
    }

    /// Recovers the rejected job for resubmission elsewhere.
    pub fn into_job(self) -> Job {
        self.job
    }
}

/// A sink for jobs with a two-phase shutdown lifecycle.
///
/// Implementations start in the running phase. `shutdown` stops intake and
/// lets present work drain; `shutdown_now` additionally signals cancellation
/// to workers and hands back whatever never started. Both are idempotent.
pub trait Executor: Send + Sync {
    /// Hands a job to the executor. Fails once shutdown has been requested.
    fn execute(&self, job: Job) -> Result<(), RejectedJob>;

    /// Requests graceful shutdown: no new work is accepted, work already
    /// handed over still runs.
    fn shutdown(&self);

    /// Requests abrupt shutdown: cancels workers and returns the jobs that
    /// never started, in no particular order.
    fn shutdown_now(&self) -> Vec<Job>;

    /// Blocks until the executor has terminated or the timeout elapses.
    /// Returns true if it terminated.
    fn await_terminated(&self, timeout: Duration) -> bool;

    fn is_terminated(&self) -> bool;
}

/// Executor that runs every job inline on the calling thread.
///
/// Useful for tests and for hosts that want the lifecycle contract without
/// any threads of their own. Jobs spawned from a running job also run inline,
/// before the `spawn` call returns. Panics from job bodies propagate to the
/// caller; the executor itself stays consistent and can still terminate.
pub struct DirectExecutor {
    inner: Arc<DirectInner>,
}

struct DirectInner {
    state: Mutex<DirectState>,
    done: Condvar,
    token: CancelToken,
    self_ref: Weak<DirectInner>,
}

struct DirectState {
    phase: ShutdownPhase,
    active: usize,
}

impl DirectExecutor {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let inner = Arc::new_cyclic(|weak| DirectInner {
            state: Mutex::new(DirectState {
                phase: ShutdownPhase::Running,
                active: 0,
            }),
            done: Condvar::new(),
            token: CancelToken::new(),
            self_ref: weak.clone(),
        });
        Self { inner }
    }

    /// The cancellation token observed by every job context. Set by
    /// `shutdown_now`.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.token
    }
}

impl DirectInner {
    fn run(self: &Arc<Self>, job: Job) -> Result<(), RejectedJob> {
        {
            let mut state = self.state.lock();
            if !state.phase.is_running() {
                return Err(RejectedJob::new(job));
            }
            state.active += 1;
        }
        // Released on every exit path, including a panicking job body.
        let _guard = ActiveGuard { inner: self };
        let ctx = TaskContext::with_spawner(
            job.id(),
            self.token.clone(),
            Arc::clone(self) as Arc<dyn Spawn>,
        );
        job.run(&ctx);
        Ok(())
    }

    fn finalize_if_idle(&self, state: &mut DirectState) {
        if !state.phase.is_running()
            && state.active == 0
            && state.phase.advance(ShutdownPhase::Terminated)
        {
            self.done.notify_all();
        }
    }
}

impl Spawn for DirectInner {
    fn spawn(&self, job: Job) -> Result<(), RejectedJob> {
        match self.self_ref.upgrade() {
            Some(inner) => inner.run(job),
            None => Err(RejectedJob::new(job)),
        }
    }
}

struct ActiveGuard<'a> {
    inner: &'a DirectInner,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.active -= 1;
        self.inner.finalize_if_idle(&mut state);
    }
}

impl Executor for DirectExecutor {
    fn execute(&self, job: Job) -> Result<(), RejectedJob> {
        self.inner.run(job)
    }

    fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.phase.advance(ShutdownPhase::ShutdownRequested) {
            tracing::debug!("direct executor shutdown requested");
        }
        self.inner.finalize_if_idle(&mut state);
    }

    fn shutdown_now(&self) -> Vec<Job> {
        let mut state = self.inner.state.lock();
        if state.phase.advance(ShutdownPhase::ShutdownRequested) {
            tracing::debug!("direct executor abrupt shutdown requested");
        }
        self.inner.token.cancel();
        self.inner.finalize_if_idle(&mut state);
        // Nothing is ever queued; jobs run inline on the submitting thread.
        Vec::new()
    }

    fn await_terminated(&self, timeout: Duration) -> bool {
        let deadline = Deadline::after(timeout);
        let mut state = self.inner.state.lock();
        while !state.phase.is_terminated() {
            match deadline.remaining() {
                None => self.inner.done.wait(&mut state),
                Some(rem) if rem.is_zero() => return false,
                Some(rem) => {
                    let _ = self.inner.done.wait_for(&mut state, rem);
                }
            }
        }
        true
    }

    fn is_terminated(&self) -> bool {
        self.inner.state.lock().phase.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_executes_job_inline() {
        let executor = DirectExecutor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        executor
            .execute(Job::new(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_after_shutdown_is_rejected_and_job_recoverable() {
        let executor = DirectExecutor::new();
        executor.shutdown();

        let job = Job::new(|_ctx| {});
        let id = job.id();
        let err = executor.execute(job).unwrap_err();
        assert_eq!(err.id(), id);

        let recovered = err.into_job();
        assert_eq!(recovered.id(), id);
    }

    #[test]
    fn test_shutdown_with_nothing_active_terminates_immediately() {
        let executor = DirectExecutor::new();
        executor.shutdown();
        assert!(executor.is_terminated());
        assert!(executor.await_terminated(Duration::ZERO));
    }

    #[test]
    fn test_await_terminated_times_out_while_running() {
        let executor = DirectExecutor::new();
        assert!(!executor.await_terminated(Duration::from_millis(10)));
        assert!(!executor.is_terminated());
    }

    #[test]
    fn test_shutdown_now_mid_job_cancels_context() {
        let executor = Arc::new(DirectExecutor::new());
        let handle = executor.clone();
        executor
            .execute(Job::new(move |ctx| {
                assert!(!ctx.is_cancelled());
                let returned = handle.shutdown_now();
                assert!(returned.is_empty());
                assert!(ctx.is_cancelled());
            }))
            .unwrap();
        assert!(executor.is_terminated());
    }

    #[test]
    fn test_spawned_job_runs_before_spawn_returns() {
        let executor = DirectExecutor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let outer = hits.clone();
        executor
            .execute(Job::new(move |ctx| {
                let inner = outer.clone();
                ctx.spawn(Job::new(move |_ctx| {
                    inner.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
                assert_eq!(outer.load(Ordering::SeqCst), 1);
                outer.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
