//! Deferred task scheduling for asynchronous delivery.
//!
//! ## Ordering Guarantees
//!
//! - Tasks submitted by one `emit` are scheduled in listener registration order
//! - [`TaskQueue`] is FIFO across all submitters
//! - Tasks enqueued while a queue is being drained run in the same drain
//!
//! ## Error Handling
//!
//! - A panicking task is caught and logged
//! - Remaining tasks continue to execute even after a panic
//!
//! Nothing scheduled here is ever cancelled: a listener removed after an emit
//! still receives the invocation that emit already scheduled.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::EventResult;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts tasks to run after the current call stack unwinds.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// FIFO queue of deferred tasks, drained explicitly by its owner.
pub struct TaskQueue {
    queue: Mutex<VecDeque<Task>>,
    len: AtomicUsize,
}

impl TaskQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Add a task to the queue
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(task));
    }

    fn push(&self, task: Task) {
        self.queue.lock().push_back(task);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next task
    pub fn dequeue(&self) -> Option<Task> {
        let task = self.queue.lock().pop_front();
        if task.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        task
    }

    /// Run tasks until the queue is empty, including tasks enqueued by the
    /// tasks themselves. Returns the number of tasks run.
    ///
    /// The lock is released before each task runs. A panicking task is
    /// logged and counted; the drain continues with the next task.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.dequeue() {
            run_with_panic_handler(task);
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "drained deferred tasks");
        }
        ran
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all pending tasks without running them
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let len = queue.len();
        queue.clear();
        self.len.fetch_sub(len, Ordering::Relaxed);
    }
}

/// Run a task, containing any panic to the task itself
fn run_with_panic_handler(task: Task) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        tracing::error!(panic = %message, "deferred task panicked");
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.push(task);
    }
}

thread_local! {
    static LOCAL_QUEUE: TaskQueue = TaskQueue::new();
}

/// Scheduler backed by the calling thread's own task queue.
///
/// Tasks run when that thread calls [`run_pending`]. This is the default
/// scheduler of asynchronous emitters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentThreadQueue;

impl Scheduler for CurrentThreadQueue {
    fn schedule(&self, task: Task) {
        LOCAL_QUEUE.with(|queue| queue.push(task));
    }
}

/// Run every task deferred on the current thread. Returns the number run.
pub fn run_pending() -> usize {
    LOCAL_QUEUE.with(TaskQueue::run_pending)
}

/// Number of tasks deferred on the current thread.
pub fn pending() -> usize {
    LOCAL_QUEUE.with(TaskQueue::len)
}

/// Scheduler that spawns each task onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Use the runtime the caller is running in.
    pub fn current() -> EventResult<Self> {
        Ok(Self {
            handle: tokio::runtime::Handle::try_current()?,
        })
    }

    /// Use an explicit runtime handle.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}
