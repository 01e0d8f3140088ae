//! Bounded single-consumer job queue.
//!
//! Every job submitted to a [`TaskQueue`] runs on the same worker task, one at
//! a time, in submission order. The worker awaits a job to completion (nested
//! I/O included) before it takes the next one, which is what gives actors their
//! sequential execution.
//!
//! When the queue is full the oldest *evictable* job is dropped to admit the
//! newest one, and its [`TaskHandle`] resolves to [`TaskError::Evicted`].
//! Jobs submitted with [`TaskQueue::submit_pinned`] are never evicted.

use crate::error::TaskError;
use async_std::task;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::task::AtomicWaker;
use futures::FutureExt;
use serde::Deserialize;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tracing::{debug, trace};

/// Queue sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of queued (not yet running) jobs before eviction starts.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> QueueConfig {
        QueueConfig { capacity: 100 }
    }
}

/// Counters of every job that went through the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// A queued job with its result type erased, so jobs returning different types
/// can share the same queue. The unit owns the sender of its handle: running it
/// resolves the handle with the job output, aborting it resolves the handle
/// with the given error.
trait Runnable: Send {
    /// Returns `false` when the job panicked.
    fn run(self: Box<Self>) -> BoxFuture<'static, bool>;

    fn abort(self: Box<Self>, reason: TaskError);
}

struct Unit<F, T> {
    job: F,
    responder: oneshot::Sender<Result<T, TaskError>>,
}

impl<F, Fut, T> Runnable for Unit<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture<'static, bool> {
        let Unit { job, responder } = *self;

        async move {
            let outcome = AssertUnwindSafe(async move { job().await })
                .catch_unwind()
                .await
                .map_err(|panic| TaskError::Panicked(panic_message(panic)));

            let succeeded = outcome.is_ok();
            // The submitter may have stopped waiting, that is fine.
            let _ = responder.send(outcome);
            succeeded
        }
        .boxed()
    }

    fn abort(self: Box<Self>, reason: TaskError) {
        let _ = self.responder.send(Err(reason));
    }
}

struct ScheduledTask {
    unit: Box<dyn Runnable>,
    evictable: bool,
    sequence: u64,
}

struct Shared {
    tasks: Mutex<VecDeque<ScheduledTask>>,
    waker: AtomicWaker,
    closed: AtomicBool,
    capacity: usize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

impl Shared {
    fn tasks(&self) -> MutexGuard<'_, VecDeque<ScheduledTask>> {
        // Only queue bookkeeping runs under this lock, never user code.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a scheduler with exactly one worker.
///
/// Cloning the handle shares the same queue and worker.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Creates the queue and spawns its worker.
    pub fn new(config: QueueConfig) -> TaskQueue {
        let shared = Arc::new(Shared {
            tasks: Mutex::new(VecDeque::new()),
            waker: AtomicWaker::new(),
            closed: AtomicBool::new(false),
            capacity: config.capacity.max(1),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        });

        task::spawn(worker_loop(shared.clone()));

        TaskQueue { shared }
    }

    /// Enqueues an evictable job and returns a future for its result.
    pub fn submit<F, Fut, T>(&self, job: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(job, true)
    }

    /// Enqueues a job that is never evicted, even when the queue is full.
    pub fn submit_pinned<F, Fut, T>(&self, job: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(job, false)
    }

    fn enqueue<F, Fut, T>(&self, job: F, evictable: bool) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let unit: Box<dyn Runnable> = Box::new(Unit { job, responder });

        let evicted = {
            let mut tasks = self.shared.tasks();

            // Checked under the lock so `close` cannot miss this task when draining.
            if self.is_closed() {
                drop(tasks);
                unit.abort(TaskError::Closed);
                return TaskHandle { receiver };
            }

            let sequence = self.shared.submitted.fetch_add(1, Ordering::Relaxed);

            let evicted = if tasks.len() >= self.shared.capacity {
                tasks
                    .iter()
                    .position(|queued| queued.evictable)
                    .and_then(|index| tasks.remove(index))
            } else {
                None
            };

            tasks.push_back(ScheduledTask {
                unit,
                evictable,
                sequence,
            });

            evicted
        };

        if let Some(evicted) = evicted {
            debug!(sequence = evicted.sequence, "queue full, evicting oldest task");
            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
            evicted.unit.abort(TaskError::Evicted);
        }

        self.shared.waker.wake();

        TaskHandle { receiver }
    }

    /// Stops the worker after the running job. Queued jobs resolve to
    /// [`TaskError::Closed`], and so does anything submitted afterwards.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending: Vec<ScheduledTask> = self.shared.tasks().drain(..).collect();

        for task in pending {
            task.unit.abort(TaskError::Closed);
        }

        self.shared.waker.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of queued jobs, the running one excluded.
    pub fn len(&self) -> usize {
        self.shared.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> TaskQueue {
        TaskQueue::new(QueueConfig::default())
    }
}

impl Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TaskQueue (queued: {}, capacity: {})",
            self.len(),
            self.capacity()
        )
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    while let Some(task) = (NextTask { shared: &shared }).await {
        trace!(sequence = task.sequence, "running task");

        if task.unit.run().await {
            shared.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!("task queue worker stopped");
}

/// Resolves with the next queued task, or with `None` once the queue closes.
struct NextTask<'a> {
    shared: &'a Shared,
}

impl NextTask<'_> {
    fn try_next(&self) -> Poll<Option<ScheduledTask>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Poll::Ready(None);
        }

        match self.shared.tasks().pop_front() {
            Some(task) => Poll::Ready(Some(task)),
            None => Poll::Pending,
        }
    }
}

impl Future for NextTask<'_> {
    type Output = Option<ScheduledTask>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        if let Poll::Ready(next) = self.try_next() {
            return Poll::Ready(next);
        }

        self.shared.waker.register(cx.waker());

        // A submission may have landed between the check and the registration.
        self.try_next()
    }
}

/// Future for the result of a submitted job.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The unit was dropped without resolving, only possible on shutdown.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
