//! Queue module: the scheduler and its building blocks.
//!
//! - **pending**: tasks waiting for a slot, ordered by priority then admission
//! - **gate**: running-count vs. concurrency ceiling
//! - **attempt**: one attempt with timeout, and the retry loop around it
//! - **drain**: `on_empty` waiters
//! - **TaskQueue**: wires the above together
//!
//! There is no polling loop. `add` starts work when a slot is free, and every
//! task that settles frees its slot and admits the next pending task.

mod attempt;
mod drain;
mod gate;
mod pending;
mod record;
mod retry;
mod state;

pub use drain::OnEmpty;
pub use retry::RetryPolicy;
pub use state::TaskState;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use self::drain::{DrainNotifier, DrainedWaiters};
use self::gate::ConcurrencyGate;
use self::pending::PendingStore;
use self::record::TaskRecord;
use crate::config::{QueueConfig, TaskOptions};
use crate::error::{ConfigError, TaskError};
use crate::ids::TaskId;
use crate::observability::QueueStats;

/// Type-erased task waiting in the pending store.
///
/// Tasks with different output and error types share one store, so each is
/// boxed behind this trait and only knows how to start itself.
trait Launch: Send {
    fn launch(self: Box<Self>, queue: TaskQueue);
}

struct TypedTask<F, T, E> {
    record: TaskRecord<F>,
    settle: oneshot::Sender<Result<T, TaskError<E>>>,
}

impl<F, Fut, T, E> Launch for TypedTask<F, T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn launch(self: Box<Self>, queue: TaskQueue) {
        let TypedTask { mut record, settle } = *self;
        record.start();
        tokio::spawn(async move {
            debug!(
                task_id = %record.id,
                priority = record.priority,
                queued_ms = record.queued_for().as_millis() as u64,
                "task started"
            );
            let result = attempt::run_to_completion(&mut record).await;
            let succeeded = record.state == TaskState::Succeeded;
            let completion = Completion {
                id: record.id,
                succeeded,
                retried: if succeeded {
                    record.attempts
                } else {
                    record.attempts.saturating_sub(1)
                },
                timed_out: record.timeouts,
            };
            // Free the slot before waking the caller, so its continuation
            // already sees the task gone from `running`.
            let admitted = queue.complete(completion);
            // the caller may have dropped its handle
            let _ = settle.send(result);
            admitted.start(&queue);
        });
    }
}

/// Summary of a settled task, for bookkeeping.
struct Completion {
    id: TaskId,
    succeeded: bool,
    retried: u32,
    timed_out: u32,
}

/// Work released by a completion, to be started once the lock is dropped.
#[must_use]
struct Admitted {
    ready: Vec<Box<dyn Launch>>,
    waiters: DrainedWaiters,
}

impl Admitted {
    fn start(self, queue: &TaskQueue) {
        for task in self.ready {
            task.launch(queue.clone());
        }
        self.waiters.settle();
    }
}

/// Scheduler state. Every mutation happens under one lock and the lock is
/// never held across an `.await`.
struct QueueState {
    gate: ConcurrencyGate,
    pending: PendingStore<Box<dyn Launch>>,
    drain: DrainNotifier,

    /// Next sequence number to assign.
    next_sequence: u64,

    stats: QueueStats,
}

impl QueueState {
    fn new(limit: usize) -> Self {
        Self {
            gate: ConcurrencyGate::new(limit),
            pending: PendingStore::new(),
            drain: DrainNotifier::default(),
            next_sequence: 1,
            stats: QueueStats {
                concurrency: limit,
                ..Default::default()
            },
        }
    }

    fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_sequence);
        self.next_sequence += 1;
        id
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.gate.running() == 0
    }

    fn record_completion(&mut self, completion: &Completion) {
        if completion.succeeded {
            self.stats.succeeded += 1;
        } else {
            self.stats.failed += 1;
        }
        self.stats.retried += u64::from(completion.retried);
        self.stats.timed_out += u64::from(completion.timed_out);
    }

    /// Fill free slots from the pending store, highest priority first. If the
    /// queue ends up idle, detach every drain waiter.
    fn admit_next(&mut self) -> (Vec<Box<dyn Launch>>, DrainedWaiters) {
        let mut ready = Vec::new();
        while self.gate.has_capacity() {
            let Some(entry) = self.pending.pop_highest() else {
                break;
            };
            let acquired = self.gate.try_acquire();
            debug_assert!(acquired);
            debug!(
                task_id = %entry.id(),
                priority = entry.priority(),
                pending = self.pending.len(),
                "task admitted from pending"
            );
            ready.push(entry.into_job());
        }

        let waiters = if self.is_idle() {
            self.drain.take()
        } else {
            DrainedWaiters::none()
        };
        (ready, waiters)
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            running: self.gate.running(),
            ..self.stats.clone()
        }
    }
}

/// In-process async task queue.
///
/// Cheap to clone; clones share the same scheduler. Tasks run on the ambient
/// tokio runtime, so `add` and `add_with` must be called from within one.
///
/// ```ignore
/// let queue = TaskQueue::with_concurrency(2)?;
/// let high = queue.add_with(|| async { Ok::<_, MyError>(1) }, TaskOptions::new().priority(10))?;
/// let flaky = queue.add_with(fetch, TaskOptions::new().retries(2).timeout_ms(500))?;
/// queue.on_empty().await;
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl TaskQueue {
    /// Queue with unbounded concurrency.
    pub fn new() -> Self {
        Self::from_limit(usize::MAX)
    }

    pub fn with_concurrency(concurrency: usize) -> Result<Self, ConfigError> {
        Self::with_config(QueueConfig::with_concurrency(concurrency))
    }

    pub fn with_config(config: QueueConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(?config, "TaskQueue::with_config");
        Ok(Self::from_limit(config.limit()))
    }

    fn from_limit(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new(limit))),
        }
    }

    // State is never left half-updated by a panic, so a poisoned lock is safe
    // to keep using.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit work with default options.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn add<F, Fut, T, E>(&self, work: F) -> TaskHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit(work, TaskOptions::default())
    }

    /// Submit work with explicit priority, retries, timeout and backoff.
    ///
    /// `work` is called once per attempt. Malformed options are rejected here,
    /// before the task touches any scheduler state.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn add_with<F, Fut, T, E>(
        &self,
        work: F,
        options: TaskOptions,
    ) -> Result<TaskHandle<T, E>, ConfigError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        options.validate()?;
        Ok(self.submit(work, options))
    }

    fn submit<F, Fut, T, E>(&self, work: F, options: TaskOptions) -> TaskHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let priority = options.priority;

        let (id, start_now) = {
            let mut state = self.lock();
            let id = state.allocate_task_id();
            state.stats.submitted += 1;

            let task: Box<dyn Launch> = Box::new(TypedTask {
                record: TaskRecord::new(id, work, options),
                settle: tx,
            });

            if state.gate.try_acquire() {
                (id, Some(task))
            } else {
                state.pending.insert(id, priority, task);
                debug!(
                    task_id = %id,
                    priority,
                    pending = state.pending.len(),
                    "no free slot, task queued"
                );
                (id, None)
            }
        };

        if let Some(task) = start_now {
            task.launch(self.clone());
        }
        TaskHandle { id, rx }
    }

    /// Called by a task's driver once it has settled: records the outcome,
    /// frees its slot and pops whatever can run next, all under one lock.
    fn complete(&self, completion: Completion) -> Admitted {
        let (ready, waiters) = {
            let mut state = self.lock();
            state.record_completion(&completion);
            state.gate.release();
            state.admit_next()
        };
        debug!(
            task_id = %completion.id,
            succeeded = completion.succeeded,
            admitted = ready.len(),
            drain_waiters = waiters.len(),
            "task settled"
        );
        Admitted { ready, waiters }
    }

    /// Number of tasks waiting for a slot.
    pub fn size(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of tasks holding a slot.
    pub fn running(&self) -> usize {
        self.lock().gate.running()
    }

    /// Configured concurrency limit (`usize::MAX` when unbounded).
    pub fn concurrency(&self) -> usize {
        self.lock().gate.limit()
    }

    /// Nothing pending and nothing running.
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// Resolves once nothing is pending or running.
    ///
    /// On an idle queue the returned future is already settled and does not
    /// wait for any further activity.
    pub fn on_empty(&self) -> OnEmpty {
        let (waiter, settled) = {
            let mut state = self.lock();
            let waiter = state.drain.register();
            let settled = if state.is_idle() {
                state.drain.take()
            } else {
                DrainedWaiters::none()
            };
            (waiter, settled)
        };
        settled.settle();
        waiter
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().snapshot()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskQueue")
            .field("concurrency", &state.gate.limit())
            .field("pending", &state.pending.len())
            .field("running", &state.gate.running())
            .field("drain_waiters", &state.drain.waiting())
            .finish()
    }
}

/// Caller's side of a submitted task.
///
/// Resolves exactly once with the task's value or with the error of its last
/// attempt. Dropping the handle does not cancel the task.
#[must_use = "dropping a TaskHandle discards the task's result"]
pub struct TaskHandle<T, E> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

impl<T, E> fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}
