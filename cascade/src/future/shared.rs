use crate::error::TaskError;
use crate::scheduler::SchedulerRef;
use crate::task::cell::{ExecFn, RawTask, TaskCell};
use crate::task::state::TaskState;
use std::sync::Arc;

/// Multi-consumer handle on a task.
///
/// Clonable; the result stays in the task and is read by reference, so any
/// number of handles can observe it. Obtained from
/// [`Stage::share`](crate::Stage::share).
pub struct SharedStage<T> {
    pub(crate) cell: Arc<TaskCell<T>>,
}

impl<T> Clone for SharedStage<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + 'static> SharedStage<T> {
    pub fn is_ready(&self) -> bool {
        self.cell.core().ready()
    }

    pub fn is_canceled(&self) -> bool {
        self.cell.core().canceled()
    }

    pub fn wait(&self) {
        self.cell.core().wait();
    }

    /// Waits and borrows the result. Errors are cloned out instead.
    pub fn get(&self) -> Result<&T, TaskError>
    where
        T: Sync,
    {
        self.cell.core().wait();
        self.cell.result_ref()
    }

    /// Waits and returns the cancellation error, or `None` if the task
    /// completed with a value.
    pub fn error(&self) -> Option<TaskError> {
        if self.cell.core().wait() == TaskState::Canceled {
            self.cell.peek_error()
        } else {
            None
        }
    }

    /// Value continuation over a borrowed result. Cancellation propagates as
    /// for [`Stage::then_on`](crate::Stage::then_on).
    pub fn then_on<R, F>(&self, sched: &SchedulerRef, f: F) -> crate::Stage<R>
    where
        T: Sync,
        R: Send + 'static,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        let this = self.clone();
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| match this.cell.result_ref() {
            Ok(value) => cell.finish_with(f(value)),
            Err(err) => cell.cancel_base(err),
        });
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        crate::Stage { cell: child }
    }

    /// Value continuation with inherited scheduler.
    pub fn then<R, F>(&self, f: F) -> crate::Stage<R>
    where
        T: Sync,
        R: Send + 'static,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.then_on(&sched, f)
    }

    /// Stage continuation: `f` receives its own shared handle once the task
    /// is terminal, whether it completed or was canceled.
    pub fn then_stage_on<R, F>(&self, sched: &SchedulerRef, f: F) -> crate::Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(SharedStage<T>) -> R + Send + 'static,
    {
        let this = self.clone();
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| cell.finish_with(f(this)));
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        crate::Stage { cell: child }
    }

    /// Stage continuation with inherited scheduler.
    pub fn then_stage<R, F>(&self, f: F) -> crate::Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(SharedStage<T>) -> R + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.then_stage_on(&sched, f)
    }
}
