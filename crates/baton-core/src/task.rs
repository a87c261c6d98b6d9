//! Task identity and the executable job unit.
//!
//! A [`Job`] is an opaque unit of work: a unique id plus a boxed closure. The
//! id exists so lifecycle machinery can talk about work it never ran (abrupt
//! shutdown returns unstarted jobs, cancellation tracking records ids). The
//! closure receives a [`TaskContext`] carrying the worker's cancellation token
//! and a handle for spawning follow-up work discovered mid-job.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::executor::RejectedJob;

/// Unique identity of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sink for work discovered while a job is running.
///
/// Implemented by executors; reachable from jobs through
/// [`TaskContext::spawn`].
pub trait Spawn: Send + Sync {
    fn spawn(&self, job: Job) -> Result<(), RejectedJob>;
}

/// Per-job environment handed to the job body.
///
/// Carries the job's own id, the worker's cancellation token, and the spawn
/// handle of the executor running the job. Long-running bodies should poll
/// [`is_cancelled`](TaskContext::is_cancelled) at natural checkpoints.
pub struct TaskContext {
    task_id: TaskId,
    cancel: CancelToken,
    spawner: Option<Arc<dyn Spawn>>,
}

impl TaskContext {
    /// Context without a spawn handle; `spawn` rejects every job.
    pub fn new(task_id: TaskId, cancel: CancelToken) -> Self {
        Self {
            task_id,
            cancel,
            spawner: None,
        }
    }

    pub fn with_spawner(task_id: TaskId, cancel: CancelToken, spawner: Arc<dyn Spawn>) -> Self {
        Self {
            task_id,
            cancel,
            spawner: Some(spawner),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// The cancellation token of the worker running this job.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hands follow-up work to the executor running this job.
    ///
    /// Placement is executor-defined: a work-stealing pool pushes to the
    /// current worker's own head by default, or to a peer's tail in a
    /// work-sharing configuration.
    pub fn spawn(&self, job: Job) -> Result<(), RejectedJob> {
        match &self.spawner {
            Some(spawner) => spawner.spawn(job),
            None => Err(RejectedJob::new(job)),
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// An executable unit of work with a stable identity.
pub struct Job {
    id: TaskId,
    body: Box<dyn FnOnce(&TaskContext) + Send + 'static>,
}

impl Job {
    pub fn new(body: impl FnOnce(&TaskContext) + Send + 'static) -> Self {
        Self::with_id(TaskId::new(), body)
    }

    /// Builds a job with a caller-chosen id. Used when re-submitting work
    /// returned by an abrupt shutdown, so the identity survives the retry.
    pub fn with_id(id: TaskId, body: impl FnOnce(&TaskContext) + Send + 'static) -> Self {
        Self {
            id,
            body: Box::new(body),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Consumes the job and runs its body.
    pub fn run(self, ctx: &TaskContext) {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_job_keeps_caller_chosen_id() {
        let id = TaskId::new();
        let job = Job::with_id(id, |_ctx| {});
        assert_eq!(job.id(), id);
    }

    #[test]
    fn test_job_run_sees_own_context() {
        let ran = Arc::new(AtomicBool::new(false));
        let observed = ran.clone();
        let job = Job::new(move |ctx| {
            assert!(!ctx.is_cancelled());
            observed.store(true, Ordering::SeqCst);
        });
        let ctx = TaskContext::new(job.id(), CancelToken::new());
        job.run(&ctx);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawn_without_handle_rejects() {
        let ctx = TaskContext::new(TaskId::new(), CancelToken::new());
        let job = Job::new(|_ctx| {});
        let id = job.id();
        let err = ctx.spawn(job).unwrap_err();
        assert_eq!(err.id(), id);
    }

    #[test]
    fn test_context_reflects_token_state() {
        let token = CancelToken::new();
        let ctx = TaskContext::new(TaskId::new(), token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
