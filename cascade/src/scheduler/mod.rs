//! Schedulers: policy objects that turn scheduled run handles into task
//! executions on some set of threads.
//!
//! The contract a scheduler must honor: `schedule(handle)` eventually calls
//! `handle.run()` exactly once, or drops the handle, whose drop cancels the
//! task as not-executed.

mod fifo;
pub mod pool;

pub use fifo::FifoScheduler;
pub use pool::{PoolBuilder, ThreadPoolScheduler};

use crate::error::TaskError;
use crate::task::cell::RawTask;
use crate::wait::WaitHandler;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

/// A scheduler turns run handles into executions. Implementations must be
/// shareable across threads; tasks keep a weak reference to the scheduler
/// that will run their continuations.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: RunHandle);
}

/// Shared reference to a scheduler, as captured by tasks at creation.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Owning, type-erased handle to a scheduled task. Runs it exactly once;
/// dropping an unrun handle cancels the task with
/// [`TaskError::NotExecuted`].
pub struct RunHandle {
    raw: Option<Arc<dyn RawTask>>,
}

impl RunHandle {
    pub(crate) fn new(raw: Arc<dyn RawTask>) -> Self {
        Self { raw: Some(raw) }
    }

    /// Runs the task and releases the handle.
    pub fn run(mut self) {
        if let Some(task) = self.raw.take() {
            task.run();
        }
    }

    /// Runs the task with `handler` installed as this thread's wait handler
    /// for the duration of the run.
    pub fn run_with_wait_handler(self, handler: WaitHandler) {
        crate::wait::with_thread_wait_handler(handler, move || self.run());
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(task) = self.raw.take() {
            task.cancel(TaskError::NotExecuted);
        }
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("pending", &self.raw.is_some())
            .finish()
    }
}

/// Wraps a task into a run handle and hands it to `sched`. A panicking
/// scheduler drops the handle mid-unwind, which cancels the task; the panic
/// stops here instead of tearing down the caller's terminal transition.
pub(crate) fn schedule_task(sched: &SchedulerRef, task: Arc<dyn RawTask>) {
    let handle = RunHandle::new(task);
    if panic::catch_unwind(AssertUnwindSafe(|| sched.schedule(handle))).is_err() {
        tracing::warn!("scheduler panicked while accepting a task; the task was canceled");
    }
}

/// Runs tasks synchronously on the calling thread, from inside `schedule`.
#[derive(Debug, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: RunHandle) {
        task.run();
    }
}

/// Spawns a fresh thread per task, fire-and-forget: nothing joins these
/// threads at process exit, so callers must synchronize through the stage
/// itself before exiting.
#[derive(Debug, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: RunHandle) {
        std::thread::Builder::new()
            .name("cascade-task".to_string())
            .spawn(move || task.run())
            .expect("failed to spawn task thread");
    }
}

static INLINE: LazyLock<SchedulerRef> = LazyLock::new(|| Arc::new(InlineScheduler));
static THREAD: LazyLock<SchedulerRef> = LazyLock::new(|| Arc::new(ThreadScheduler));
static DEFAULT_POOL: LazyLock<SchedulerRef> = LazyLock::new(|| {
    Arc::new(ThreadPoolScheduler::new(crate::config::default_num_threads()))
});

/// The process-wide inline scheduler.
pub fn inline_scheduler() -> SchedulerRef {
    INLINE.clone()
}

/// The process-wide thread-per-task scheduler.
pub fn thread_scheduler() -> SchedulerRef {
    THREAD.clone()
}

/// The process-wide work-stealing pool, built lazily with
/// [`config::default_num_threads`](crate::config) workers. Used by `spawn`
/// and friends when no scheduler is given.
pub fn default_scheduler() -> SchedulerRef {
    DEFAULT_POOL.clone()
}
