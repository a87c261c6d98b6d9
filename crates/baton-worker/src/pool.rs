//! Work-stealing thread pool.
//!
//! Every worker owns one [`WorkerDeque`] and works its own head without
//! touching any pool-wide lock; an empty worker probes the other deques'
//! tails before parking. Lifecycle accounting runs on a single outstanding
//! counter: a job is counted from just before its push until its body has
//! finished, so "shutdown requested and nothing outstanding" can never
//! overlook a job that sits in a deque or runs on a worker. The pool lock
//! guards only the lifecycle gate: external submissions and peer-tail spawns
//! push under it so an abrupt sweep cannot miss them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use baton_core::{
    CancelToken, Deadline, Executor, Job, RejectedJob, ShutdownPhase, Spawn, TaskContext,
};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use thiserror::Error;

use crate::deque::WorkerDeque;

/// Where [`TaskContext::spawn`] places work discovered mid-job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnPlacement {
    /// The spawning worker's own head: it runs the job next, newest first.
    #[default]
    LocalHead,
    /// A peer's tail, round-robin. A single-worker pool shares with itself.
    PeerTail,
}

/// Tunables for a [`StealPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker thread count. Zero is clamped to one.
    pub workers: usize,
    /// Placement for jobs spawned from inside a running job.
    pub placement: SpawnPlacement,
    /// Name prefix for worker threads; the worker index is appended.
    pub thread_name_prefix: String,
    /// Upper bound on one idle park. Bounds how long a missed wakeup can
    /// leave a worker idle while work sits in a deque.
    pub park_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, usize::from),
            placement: SpawnPlacement::default(),
            thread_name_prefix: "baton-worker".to_string(),
            park_timeout: Duration::from_millis(100),
        }
    }
}

/// Error from [`StealPool::start`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker thread could not be spawned. Workers already started were
    /// stopped and joined before this was returned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fixed-size work-stealing pool behind the [`Executor`] seam.
///
/// External submissions land on deque tails round-robin; each worker drains
/// its own deque head-first and steals from peers when empty. `shutdown`
/// lets present work drain, spawned follow-ups included; `shutdown_now`
/// cancels the per-worker tokens and hands back everything unstarted.
///
/// Dropping the pool requests a graceful shutdown and joins the workers.
pub struct StealPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct PoolShared {
    deques: Vec<WorkerDeque<Job>>,
    tokens: Vec<CancelToken>,
    /// Jobs accepted and not yet finished: counted before the push, settled
    /// after the body returns or when an abrupt stop hands the job back.
    outstanding: AtomicUsize,
    /// Raised by an abrupt stop before the deques are swept.
    abrupt: AtomicBool,
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
    next_submit: AtomicUsize,
    next_share: AtomicUsize,
    placement: SpawnPlacement,
    park_timeout: Duration,
}

struct PoolState {
    phase: ShutdownPhase,
    /// Worker threads that have not exited.
    live: usize,
}

#[derive(PartialEq)]
enum IdleStep {
    Retry,
    Exit,
}

impl StealPool {
    /// Starts the workers and returns the running pool.
    pub fn start(config: PoolConfig) -> Result<Self, PoolError> {
        let worker_count = config.workers.max(1);
        let shared = Arc::new(PoolShared {
            deques: (0..worker_count).map(|_| WorkerDeque::new()).collect(),
            tokens: (0..worker_count).map(|_| CancelToken::new()).collect(),
            outstanding: AtomicUsize::new(0),
            abrupt: AtomicBool::new(false),
            state: Mutex::new(PoolState {
                phase: ShutdownPhase::Running,
                live: 0,
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
            next_submit: AtomicUsize::new(0),
            next_share: AtomicUsize::new(0),
            placement: config.placement,
            park_timeout: config.park_timeout,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            // Counted before the spawn so an early exit can never be missed.
            shared.state.lock().live += 1;
            let worker_shared = shared.clone();
            let spawned = Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || worker_main(worker_shared, index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    abort_startup(&shared, workers);
                    return Err(PoolError::Spawn(source));
                }
            }
        }

        tracing::info!(
            workers = worker_count,
            placement = ?config.placement,
            "steal pool started"
        );
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.shared.deques.len()
    }

    /// Jobs currently queued across all deques. A racy snapshot for logs
    /// and monitoring.
    pub fn queued_len(&self) -> usize {
        self.shared.queued_total()
    }
}

impl Executor for StealPool {
    fn execute(&self, job: Job) -> Result<(), RejectedJob> {
        self.shared.submit(job)
    }

    fn shutdown(&self) {
        self.shared.shutdown();
    }

    fn shutdown_now(&self) -> Vec<Job> {
        self.shared.shutdown_now()
    }

    fn await_terminated(&self, timeout: Duration) -> bool {
        self.shared.await_terminated(timeout)
    }

    fn is_terminated(&self) -> bool {
        self.shared.state.lock().phase.is_terminated()
    }
}

impl Drop for StealPool {
    fn drop(&mut self) {
        self.shutdown();
        for worker in self.workers.lock().drain(..) {
            // Workers catch job panics; join cannot fail.
            let _ = worker.join();
        }
    }
}

/// Stops and joins the workers already running after a failed spawn.
fn abort_startup(shared: &Arc<PoolShared>, workers: Vec<JoinHandle<()>>) {
    {
        let mut state = shared.state.lock();
        // The failed thread never existed; take its live count back.
        state.live -= 1;
        state.phase.advance(ShutdownPhase::ShutdownRequested);
        shared.abrupt.store(true, Ordering::SeqCst);
    }
    for token in &shared.tokens {
        token.cancel();
    }
    shared.work_available.notify_all();
    for worker in workers {
        let _ = worker.join();
    }
}

fn worker_main(shared: Arc<PoolShared>, index: usize) {
    let spawner: Arc<dyn Spawn> = Arc::new(WorkerSpawner {
        shared: shared.clone(),
        index,
    });
    let token = shared.tokens[index].clone();
    tracing::debug!(worker = index, "worker started");

    loop {
        if token.is_cancelled() {
            tracing::debug!(worker = index, "worker cancelled");
            break;
        }
        if let Some(job) = shared.claim(index) {
            shared.run_job(index, job, &token, &spawner);
            continue;
        }
        if shared.idle_park(&token) == IdleStep::Exit {
            break;
        }
    }

    shared.worker_exited(index);
}

impl PoolShared {
    /// Claims the next job for `worker`: own head first, then peer tails.
    /// Touches only deque locks, so a busy worker never meets pool-wide
    /// contention on its own queue.
    fn claim(&self, worker: usize) -> Option<Job> {
        self.deques[worker]
            .pop()
            .or_else(|| self.steal_from_peers(worker))
    }

    /// Probes every peer once, starting at a random victim and sweeping
    /// in order from there, so no deque is persistently favored or starved.
    fn steal_from_peers(&self, thief: usize) -> Option<Job> {
        let count = self.deques.len();
        if count <= 1 {
            return None;
        }
        let start = rand::rng().random_range(0..count);
        for offset in 0..count {
            let victim = (start + offset) % count;
            if victim == thief {
                continue;
            }
            if let Some(job) = self.deques[victim].steal() {
                tracing::trace!(thief, victim, "stole a job");
                return Some(job);
            }
        }
        None
    }

    fn run_job(&self, worker: usize, job: Job, token: &CancelToken, spawner: &Arc<dyn Spawn>) {
        let id = job.id();
        let ctx = TaskContext::with_spawner(id, token.clone(), spawner.clone());
        let outcome = catch_unwind(AssertUnwindSafe(|| job.run(&ctx)));
        if let Err(panic) = outcome {
            tracing::error!(
                worker,
                task_id = %id,
                panic = panic_message(panic.as_ref()),
                "job panicked; worker continues"
            );
        }
        // Settling the last outstanding job wakes parked peers; during a
        // drain that lets them observe quiescence and exit.
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.work_available.notify_all();
        }
    }

    /// One idle round: exit if told to, retry if work appeared, otherwise
    /// park for at most `park_timeout`. The bounded park also covers a
    /// wakeup that races the decision to sleep; staleness never exceeds
    /// one timeout.
    fn idle_park(&self, token: &CancelToken) -> IdleStep {
        let mut state = self.state.lock();
        if self.abrupt.load(Ordering::SeqCst) || token.is_cancelled() {
            return IdleStep::Exit;
        }
        if !state.phase.is_running() && self.outstanding.load(Ordering::SeqCst) == 0 {
            return IdleStep::Exit;
        }
        if !self.all_deques_empty() {
            return IdleStep::Retry;
        }
        let _ = self.work_available.wait_for(&mut state, self.park_timeout);
        IdleStep::Retry
    }

    fn worker_exited(&self, worker: usize) {
        let mut state = self.state.lock();
        state.live -= 1;
        tracing::debug!(worker, live = state.live, "worker exited");
        if state.live == 0 && state.phase.advance(ShutdownPhase::Terminated) {
            tracing::info!("steal pool terminated");
            self.terminated.notify_all();
        }
    }

    /// The state lock spans the gate and the push: a submission accepted
    /// before a shutdown transition is counted and queued before any abrupt
    /// sweep can run, so it is either executed or handed back, never lost.
    fn submit(&self, job: Job) -> Result<(), RejectedJob> {
        let state = self.state.lock();
        if !state.phase.is_running() {
            return Err(RejectedJob::new(job));
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let slot = self.next_submit.fetch_add(1, Ordering::Relaxed) % self.deques.len();
        self.deques[slot].push_tail(job);
        drop(state);
        self.work_available.notify_one();
        Ok(())
    }

    /// Places work discovered by `worker` mid-job. Accepted during a
    /// graceful drain, where the spawning job is part of the present work;
    /// refused once an abrupt stop has discarded the queues.
    fn spawn_from(&self, worker: usize, job: Job) -> Result<(), RejectedJob> {
        match self.placement {
            // Own-head placement stays off the pool lock. The recheck after
            // the push closes the race with an abrupt sweep: a sweep that
            // ran first is visible by then, and the job is still on our own
            // head unless the sweep or a thief already took it.
            SpawnPlacement::LocalHead => {
                if self.abrupt.load(Ordering::SeqCst) {
                    return Err(RejectedJob::new(job));
                }
                self.outstanding.fetch_add(1, Ordering::SeqCst);
                self.deques[worker].push(job);
                if self.abrupt.load(Ordering::SeqCst) {
                    if let Some(job) = self.deques[worker].pop() {
                        self.outstanding.fetch_sub(1, Ordering::SeqCst);
                        return Err(RejectedJob::new(job));
                    }
                }
                // The spawning worker claims its own head next; no wakeup
                // needed.
                Ok(())
            }
            // Sharing pushes to a peer's queue, so it runs under the same
            // gate as external submissions.
            SpawnPlacement::PeerTail => {
                let state = self.state.lock();
                if self.abrupt.load(Ordering::SeqCst) {
                    return Err(RejectedJob::new(job));
                }
                self.outstanding.fetch_add(1, Ordering::SeqCst);
                let count = self.deques.len();
                let mut peer = self.next_share.fetch_add(1, Ordering::Relaxed) % count;
                if peer == worker && count > 1 {
                    peer = (peer + 1) % count;
                }
                self.deques[peer].push_tail(job);
                drop(state);
                self.work_available.notify_one();
                Ok(())
            }
        }
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.phase.advance(ShutdownPhase::ShutdownRequested) {
                tracing::info!(queued = self.queued_total(), "steal pool draining");
            }
        }
        self.work_available.notify_all();
    }

    fn shutdown_now(&self) -> Vec<Job> {
        {
            let mut state = self.state.lock();
            state.phase.advance(ShutdownPhase::ShutdownRequested);
            // Raised under the lock so no gated push can slip between the
            // flag and the sweep.
            self.abrupt.store(true, Ordering::SeqCst);
        }
        for token in &self.tokens {
            token.cancel();
        }
        let mut unstarted = Vec::new();
        for deque in &self.deques {
            unstarted.extend(deque.drain());
        }
        if !unstarted.is_empty() {
            // Swept jobs were counted at push time; settle them here.
            self.outstanding.fetch_sub(unstarted.len(), Ordering::SeqCst);
            tracing::warn!(
                unstarted = unstarted.len(),
                "abrupt pool stop returned unstarted jobs"
            );
        }
        self.work_available.notify_all();
        unstarted
    }

    fn await_terminated(&self, timeout: Duration) -> bool {
        let deadline = Deadline::after(timeout);
        let mut state = self.state.lock();
        while !state.phase.is_terminated() {
            match deadline.remaining() {
                None => self.terminated.wait(&mut state),
                Some(rem) if rem.is_zero() => return false,
                Some(rem) => {
                    let _ = self.terminated.wait_for(&mut state, rem);
                }
            }
        }
        true
    }

    fn all_deques_empty(&self) -> bool {
        self.deques.iter().all(WorkerDeque::is_empty)
    }

    fn queued_total(&self) -> usize {
        self.deques.iter().map(WorkerDeque::len).sum()
    }
}

/// Spawn handle bound to one worker, reachable from job contexts.
struct WorkerSpawner {
    shared: Arc<PoolShared>,
    index: usize,
}

impl Spawn for WorkerSpawner {
    fn spawn(&self, job: Job) -> Result<(), RejectedJob> {
        self.shared.spawn_from(self.index, job)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
