use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;

/// A deferred continuation
pub type Task = Box<dyn FnOnce() + Send>;

/// FIFO queue of deferred continuations.
///
/// `run` is a trampoline: tasks enqueued by a running task execute in the
/// same drain, after everything already queued, without growing the stack.
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    shutdown: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(true),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a task to the tail
    pub fn add(&self, task: impl FnOnce() + Send + 'static) {
        self.tasks().push_back(Box::new(task));
    }

    /// Drain the queue, including tasks added while draining.
    ///
    /// Returns the number of tasks executed.
    pub fn run(&self) -> usize {
        let mut executed = 0;
        // The guard is a temporary, released before the task runs
        while let Some(task) = self.pop() {
            task();
            executed += 1;
        }
        if executed > 0 {
            log::trace!("Task queue drained {} task(s)", executed);
        }
        executed
    }

    fn pop(&self) -> Option<Task> {
        self.tasks().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    /// Turn off the drain performed at shutdown
    pub fn disable_shutdown(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
    }

    pub fn is_shutdown_enabled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Drain once if shutdown draining is enabled and work is pending.
    ///
    /// Returns the number of tasks executed.
    pub fn run_at_shutdown(&self) -> usize {
        if self.is_shutdown_enabled() && !self.is_empty() {
            log::debug!("Draining {} pending task(s) at shutdown", self.len());
            self.run()
        } else {
            0
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .field("shutdown", &self.is_shutdown_enabled())
            .finish()
    }
}

static GLOBAL_QUEUE: OnceLock<Arc<TaskQueue>> = OnceLock::new();

/// Process-wide default queue used by promises built without a queue
pub fn global() -> Arc<TaskQueue> {
    GLOBAL_QUEUE.get_or_init(|| Arc::new(TaskQueue::new())).clone()
}

/// Drains its queue at scope exit, see [`TaskQueue::run_at_shutdown`].
///
/// Hold one in `main` so unawaited continuations run before the process exits.
#[must_use = "the queue is drained when the guard is dropped"]
pub struct ShutdownGuard {
    queue: Arc<TaskQueue>,
}

impl ShutdownGuard {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Guard for the global queue
    pub fn global() -> Self {
        Self::new(global())
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.queue.run_at_shutdown();
    }
}

/// Kernel component owning the application's [`TaskQueue`].
///
/// Stopping the component performs the shutdown drain.
#[derive(Debug, Clone)]
pub struct QueueComponent {
    name: &'static str,
    queue: Arc<TaskQueue>,
}

impl QueueComponent {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            name: "TaskQueue",
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}

#[async_trait]
impl KernelComponent for QueueComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let executed = self.queue.run_at_shutdown();
        if executed > 0 {
            log::info!("Ran {} deferred task(s) before shutdown", executed);
        }
        Ok(())
    }
}
