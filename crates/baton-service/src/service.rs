//! The producer-consumer handoff service.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

use baton_core::{CancelToken, ShutdownPhase};
use baton_queue::{BlockingQueue, TakeError};
use parking_lot::Mutex;

use crate::coordinator::ShutdownCoordinator;
use crate::error::{ServiceError, SubmitError};
use crate::sink::Sink;

/// Tunables for a [`HandoffService`].
#[derive(Debug, Clone)]
pub struct HandoffConfig {
    /// Name given to the consumer thread.
    pub consumer_thread_name: String,
    /// Upper bound on one idle wait in the consumer loop. Between waits the
    /// consumer re-checks shutdown progress, so this bounds how long a
    /// graceful stop of an idle service can take.
    pub idle_wait: Duration,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            consumer_thread_name: "baton-consumer".to_string(),
            idle_wait: Duration::from_millis(100),
        }
    }
}

/// A blocking queue with one consumer thread behind a submit/stop lifecycle.
///
/// Producers on any thread hand items over with [`submit`](Self::submit);
/// the single consumer thread dequeues them and feeds the [`Sink`]. The
/// service promises that every item accepted before [`stop`](Self::stop) is
/// delivered to the sink before the service terminates. [`stop_now`](Self::stop_now)
/// breaks that promise explicitly and hands the undelivered items back.
///
/// Dropping the service requests a graceful stop and joins the consumer.
pub struct HandoffService<T: Send + 'static> {
    shared: Arc<ServiceShared<T>>,
    consumer_token: CancelToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

struct ServiceShared<T> {
    queue: Arc<dyn BlockingQueue<T>>,
    coordinator: ShutdownCoordinator,
    idle_wait: Duration,
}

impl<T: Send + 'static> HandoffService<T> {
    /// Starts the consumer thread and returns the running service.
    ///
    /// The queue is shared: the caller may keep a handle for monitoring,
    /// but items should flow in through [`submit`](Self::submit) so the
    /// accept gate sees them.
    pub fn start<S>(
        queue: Arc<dyn BlockingQueue<T>>,
        sink: S,
        config: HandoffConfig,
    ) -> Result<Self, ServiceError>
    where
        S: Sink<T> + 'static,
    {
        let shared = Arc::new(ServiceShared {
            queue,
            coordinator: ShutdownCoordinator::new(),
            idle_wait: config.idle_wait,
        });
        let consumer_token = CancelToken::new();

        let thread_shared = shared.clone();
        let thread_token = consumer_token.clone();
        let consumer = Builder::new()
            .name(config.consumer_thread_name.clone())
            .spawn(move || consumer_main(thread_shared, sink, thread_token))?;

        tracing::info!(
            consumer_thread = %config.consumer_thread_name,
            capacity = ?shared.queue.capacity(),
            "handoff service started"
        );

        Ok(Self {
            shared,
            consumer_token,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Hands one item to the service, waiting for queue space if needed.
    ///
    /// Acceptance is decided first, atomically against shutdown: once this
    /// method has passed the accept gate the item will be delivered even if
    /// [`stop`](Self::stop) lands while the enqueue is still blocked. On any
    /// failure the item comes back inside the error.
    pub fn submit(&self, item: T, token: &CancelToken) -> Result<(), SubmitError<T>> {
        if self.shared.coordinator.request_accept().is_err() {
            return Err(SubmitError::Shutdown(item));
        }
        // The reservation is held across the blocking put; the consumer
        // drains until every reservation is settled.
        match self.shared.queue.put(item, token) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shared.coordinator.release_many(1);
                Err(err.into())
            }
        }
    }

    /// Requests graceful shutdown and returns without waiting.
    ///
    /// New submissions fail immediately; items already accepted are still
    /// delivered. The consumer notices within one idle wait.
    pub fn stop(&self) {
        if self.shared.coordinator.begin_shutdown() {
            tracing::info!(
                queued = self.shared.queue.len(),
                reservations = self.shared.coordinator.reservations(),
                "shutdown requested; draining accepted items"
            );
        }
    }

    /// Abrupt shutdown: cancels the consumer, closes the queue, and returns
    /// every undelivered item in delivery order for optional persistence.
    ///
    /// An item the consumer has already dequeued is processed, not returned,
    /// so delivery may run one item past this call. A producer blocked in
    /// [`submit`](Self::submit) gets its item back through
    /// [`SubmitError::Closed`] rather than through this return value.
    pub fn stop_now(&self) -> Vec<T> {
        self.shared.coordinator.begin_shutdown();
        self.consumer_token.cancel();
        self.shared.queue.close();
        let discarded = self.shared.queue.drain();
        self.shared.coordinator.release_many(discarded.len());
        if !discarded.is_empty() {
            tracing::warn!(
                discarded = discarded.len(),
                "abrupt stop discarded queued items"
            );
        }
        discarded
    }

    /// Blocks until the consumer has exited or the timeout elapses.
    /// Returns true if the service terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.shared.coordinator.await_termination(timeout)
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.shared.coordinator.phase()
    }

    /// Items currently queued. A racy snapshot for logs and monitoring.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }
}

impl<T: Send + 'static> Drop for HandoffService<T> {
    fn drop(&mut self) {
        self.stop();
        if let Some(consumer) = self.consumer.lock().take() {
            // The consumer catches its own panics; join cannot fail.
            let _ = consumer.join();
        }
    }
}

fn consumer_main<T, S>(shared: Arc<ServiceShared<T>>, sink: S, token: CancelToken)
where
    T: Send + 'static,
    S: Sink<T>,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| consume(&shared, sink, &token)));
    if let Err(panic) = outcome {
        tracing::error!(
            panic = panic_message(panic.as_ref()),
            "consumer panicked; undelivered items stay queued"
        );
    }
    // Unconditional: even a panicking consumer must not strand
    // await_termination callers.
    if shared.coordinator.finalize() {
        tracing::info!("handoff service terminated");
    }
}

fn consume<T, S>(shared: &ServiceShared<T>, mut sink: S, token: &CancelToken)
where
    T: Send + 'static,
    S: Sink<T>,
{
    loop {
        if token.is_cancelled() {
            tracing::debug!("consumer cancelled");
            break;
        }
        if shared.coordinator.is_quiesced(shared.queue.len()) {
            break;
        }
        match shared.queue.take_timeout(shared.idle_wait, token) {
            Ok(item) => {
                if let Err(error) = sink.accept(item) {
                    tracing::error!(%error, "sink rejected an item; item dropped");
                }
                shared.coordinator.complete_one();
            }
            // Idle slice elapsed; loop around to re-check shutdown progress.
            Err(TakeError::Empty) => {}
            Err(TakeError::Cancelled) => {
                tracing::debug!("consumer take cancelled");
                break;
            }
            Err(TakeError::Closed) => break,
        }
    }
    sink.close();
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
