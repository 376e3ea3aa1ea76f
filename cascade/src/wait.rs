//! Thread-local wait handlers.
//!
//! Blocking on a stage goes through the calling thread's wait handler. The
//! default handler sleeps on a condition variable; pool workers install a
//! cooperative handler that executes other scheduler work until the awaited
//! task becomes ready.

use crate::scheduler;
use crate::task::cell::{ExecFn, RawTask, TaskCell, TaskCore};
use crate::utils::scope_guard::ScopeGuard;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::sync::Arc;

/// Handle on the awaited task, passed to wait handlers. A handler must only
/// return once [`is_ready`](Self::is_ready) holds.
pub struct TaskWaitHandle<'a> {
    core: &'a TaskCore,
}

impl TaskWaitHandle<'_> {
    /// Whether the awaited task reached a terminal state.
    pub fn is_ready(&self) -> bool {
        self.core.ready()
    }

    /// Queues `f` to run when the awaited task finishes. If the task is
    /// already finished, `f` runs inline before this returns.
    pub fn on_finish<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let exec: ExecFn<()> = Box::new(move |cell| {
            f();
            cell.finish_with(());
        });
        let inline = scheduler::inline_scheduler();
        let cont: Arc<dyn RawTask> = TaskCell::new(Some(&inline), exec);
        self.core.add_continuation(cont);
    }
}

/// A wait handler: runs until the awaited task is ready. Installed per
/// thread; handlers nest by saving and restoring the previous one.
pub type WaitHandler = fn(TaskWaitHandle<'_>);

thread_local! {
    static WAIT_HANDLER: Cell<WaitHandler> = Cell::new(sleeping_wait_handler);
}

/// Installs `handler` as this thread's wait handler and returns the previous
/// one.
pub fn set_thread_wait_handler(handler: WaitHandler) -> WaitHandler {
    WAIT_HANDLER.with(|current| current.replace(handler))
}

/// Runs `f` with `handler` installed, restoring the previous handler on every
/// exit path.
pub fn with_thread_wait_handler<R>(handler: WaitHandler, f: impl FnOnce() -> R) -> R {
    let previous = set_thread_wait_handler(handler);
    let _restore = ScopeGuard::new(move || {
        set_thread_wait_handler(previous);
    });
    f()
}

/// Blocks the calling thread until `core` is terminal, through the installed
/// wait handler.
pub(crate) fn wait_for_task(core: &TaskCore) {
    let handler = WAIT_HANDLER.with(|current| current.get());
    handler(TaskWaitHandle { core });
}

/// The default handler: sleeps on a condition variable until the task's
/// continuations fire.
pub fn sleeping_wait_handler(task: TaskWaitHandle<'_>) {
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let signal = Arc::clone(&gate);
    task.on_finish(move || {
        let (lock, condvar) = &*signal;
        *lock.lock() = true;
        condvar.notify_all();
    });

    let (lock, condvar) = &*gate;
    let mut done = lock.lock();
    while !*done {
        condvar.wait(&mut done);
    }
}
