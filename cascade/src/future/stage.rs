use crate::error::TaskError;
use crate::scheduler::{self, SchedulerRef};
use crate::task::cell::{ExecFn, RawTask, TaskCell};
use crate::task::state::TaskState;
use std::sync::Arc;

/// Single-consumer handle on a task.
///
/// A stage is an eager future: its task is already scheduled (or finished)
/// by the time the handle exists. Consuming operations (`get`, the
/// continuation builders, `share`) take the handle by value, so a handle can
/// never be used after its result moved on — there is no "empty handle"
/// state to misuse.
pub struct Stage<T> {
    pub(crate) cell: Arc<TaskCell<T>>,
}

impl<T: Send + 'static> Stage<T> {
    /// A stage that already completed with `value`.
    pub fn completed(value: T) -> Self {
        Self {
            cell: TaskCell::new_completed(value),
        }
    }

    /// A stage that was already canceled with `err`.
    pub fn canceled(err: TaskError) -> Self {
        Self {
            cell: TaskCell::new_canceled(err),
        }
    }

    /// Whether the task reached a terminal state.
    pub fn is_ready(&self) -> bool {
        self.cell.core().ready()
    }

    /// Whether the task was canceled with an error.
    pub fn is_canceled(&self) -> bool {
        self.cell.core().canceled()
    }

    /// Blocks until the task is terminal, through this thread's wait
    /// handler.
    pub fn wait(&self) {
        self.cell.core().wait();
    }

    /// Waits and moves the result out, consuming the handle. Returns the
    /// cancellation error if the task failed.
    pub fn get(self) -> Result<T, TaskError> {
        self.cell.core().wait();
        self.cell.take_result()
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

    /// Value continuation on an explicit scheduler: runs `f` on this stage's
    /// result once it completes. If this stage is canceled, `f` never runs
    /// and the child is canceled with the same error.
    pub fn then_on<R, F>(self, sched: &SchedulerRef, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| match self.cell.take_result() {
            Ok(value) => cell.finish_with(f(value)),
            Err(err) => cell.cancel_base(err),
        });
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        Stage { cell: child }
    }

    /// Value continuation; the child inherits this stage's scheduler, the
    /// inline scheduler if it has none.
    pub fn then<R, F>(self, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.then_on(&sched, f)
    }

    /// Stage continuation: runs `f` with this whole handle once the task is
    /// terminal, whether it completed or was canceled. `f` can inspect the
    /// outcome and recover from errors.
    pub fn then_stage_on<R, F>(self, sched: &SchedulerRef, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(Stage<T>) -> R + Send + 'static,
    {
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| cell.finish_with(f(self)));
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        Stage { cell: child }
    }

    /// Stage continuation with inherited scheduler.
    pub fn then_stage<R, F>(self, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(Stage<T>) -> R + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.then_stage_on(&sched, f)
    }

    /// Unwrapping value continuation: `f` returns another stage, and the
    /// child completes with that inner stage's result instead of with the
    /// stage itself. Cancellation of this stage propagates as in
    /// [`then_on`](Self::then_on); cancellation of the inner stage cancels
    /// the child.
    pub fn and_then_on<R, F>(self, sched: &SchedulerRef, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> Stage<R> + Send + 'static,
    {
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| match self.cell.take_result() {
            Ok(value) => unwrapped_finish(Arc::clone(cell), f(value)),
            Err(err) => cell.cancel_base(err),
        });
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        Stage { cell: child }
    }

    /// Unwrapping value continuation with inherited scheduler.
    pub fn and_then<R, F>(self, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> Stage<R> + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.and_then_on(&sched, f)
    }

    /// Unwrapping stage continuation: `f` receives the whole handle and
    /// returns another stage to forward.
    pub fn and_then_stage_on<R, F>(self, sched: &SchedulerRef, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(Stage<T>) -> Stage<R> + Send + 'static,
    {
        let parent = Arc::clone(&self.cell);
        let exec: ExecFn<R> = Box::new(move |cell| unwrapped_finish(Arc::clone(cell), f(self)));
        let child = TaskCell::new(Some(sched), exec);
        let raw: Arc<dyn RawTask> = child.clone() as Arc<dyn RawTask>;
        parent.core().add_continuation(raw);
        Stage { cell: child }
    }

    /// Unwrapping stage continuation with inherited scheduler.
    pub fn and_then_stage<R, F>(self, f: F) -> Stage<R>
    where
        R: Send + 'static,
        F: FnOnce(Stage<T>) -> Stage<R> + Send + 'static,
    {
        let sched = self.cell.core().sched_or_inline();
        self.and_then_stage_on(&sched, f)
    }

    /// Converts into a multi-consumer handle.
    pub fn share(self) -> crate::future::SharedStage<T> {
        crate::future::SharedStage { cell: self.cell }
    }
}

/// Forwards an inner stage's completion as the outer task's result.
///
/// The outer task is parked in the Unwrapped state (not terminal; its
/// continuations stay registered) and a forwarding continuation is attached
/// to the inner stage. When the inner finishes, the outer completes or
/// cancels with the inner's outcome and only then flushes its own
/// continuations.
pub(crate) fn unwrapped_finish<T: Send + 'static>(outer: Arc<TaskCell<T>>, inner: Stage<T>) {
    outer.transition_unwrapped();
    let sched = outer.core().sched_or_inline();
    let _ = inner.then_stage_on(&sched, move |inner: Stage<T>| {
        match inner.cell.take_result() {
            Ok(value) => outer.finish_with(value),
            Err(err) => outer.cancel_base(err),
        }
    });
}

/// Spawns `f` as a root task on `sched` and returns its stage.
pub fn spawn_on<T, F>(sched: &SchedulerRef, f: F) -> Stage<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let exec: ExecFn<T> = Box::new(move |cell| cell.finish_with(f()));
    let cell = TaskCell::new(Some(sched), exec);
    let raw: Arc<dyn RawTask> = cell.clone() as Arc<dyn RawTask>;
    scheduler::schedule_task(sched, raw);
    Stage { cell }
}

/// Spawns `f` on the default work-stealing pool.
pub fn spawn<T, F>(f: F) -> Stage<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    spawn_on(&scheduler::default_scheduler(), f)
}

/// Spawns a root task whose function returns a stage, forwarding the inner
/// stage's completion: `spawn_flat(|| Stage::completed(v)).get() == Ok(v)`.
pub fn spawn_flat_on<T, F>(sched: &SchedulerRef, f: F) -> Stage<T>
where
    T: Send + 'static,
    F: FnOnce() -> Stage<T> + Send + 'static,
{
    let exec: ExecFn<T> = Box::new(move |cell| unwrapped_finish(Arc::clone(cell), f()));
    let cell = TaskCell::new(Some(sched), exec);
    let raw: Arc<dyn RawTask> = cell.clone() as Arc<dyn RawTask>;
    scheduler::schedule_task(sched, raw);
    Stage { cell }
}

/// Spawns an unwrapping root task on the default pool.
pub fn spawn_flat<T, F>(f: F) -> Stage<T>
where
    T: Send + 'static,
    F: FnOnce() -> Stage<T> + Send + 'static,
{
    spawn_flat_on(&scheduler::default_scheduler(), f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Event;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Stage<u32>: Send, Sync);
    assert_impl_all!(Stage<String>: Send, Sync);

    fn inline() -> SchedulerRef {
        scheduler::inline_scheduler()
    }

    #[test]
    fn completed_literal_yields_its_value() {
        let stage = Stage::completed(41_u32);
        assert!(stage.is_ready());
        assert!(!stage.is_canceled());
        assert_eq!(stage.get(), Ok(41));
    }

    #[test]
    fn canceled_literal_yields_its_error() {
        let stage = Stage::<u32>::canceled(TaskError::AbandonedEvent);
        assert!(stage.is_ready());
        assert!(stage.is_canceled());
        assert_eq!(stage.error(), Some(TaskError::AbandonedEvent));
        assert_eq!(stage.get(), Err(TaskError::AbandonedEvent));
    }

    #[test]
    fn spawn_then_chain_of_three() {
        let first = spawn_on(&inline(), || "done".to_string());
        let second = first.then(|s| format!("{s}!"));
        let third = second.then(|s| s.len());

        third.wait();
        assert!(third.is_ready());
        assert!(!third.is_canceled());
        assert_eq!(third.get(), Ok(5));
    }

    #[test]
    fn then_propagates_cancellation_without_running() {
        let boom = spawn_on(&inline(), || -> u32 { panic!("boom") });
        assert!(boom.is_canceled());
        let child = boom.then(|v| v + 1);
        assert!(child.is_canceled());
        assert_eq!(child.get(), Err(TaskError::Panicked("boom".to_string())));
    }

    #[test]
    fn then_stage_runs_on_canceled_parent() {
        let boom = spawn_on(&inline(), || -> u32 { panic!("boom") });
        let recovered = boom.then_stage(|parent| {
            assert!(parent.is_canceled());
            parent.get().unwrap_or(99)
        });
        assert_eq!(recovered.get(), Ok(99));
    }

    #[test]
    fn continuation_added_after_completion_runs_inline() {
        let stage = Stage::completed(1_u32).then(|v| v + 1);
        // The parent was terminal, so the child was dispatched immediately on
        // this thread via the inline fallback.
        assert!(stage.is_ready());
        assert_eq!(stage.get(), Ok(2));
    }

    #[test]
    fn continuations_added_before_completion_run_at_flush() {
        let mut event = Event::new();
        let chained = event.stage().then(|v: u32| v * 2);
        assert!(!chained.is_ready());
        assert!(event.set(21));
        assert_eq!(chained.get(), Ok(42));
    }

    #[test]
    fn unwrap_forwards_inner_completion() {
        let out = spawn_flat_on(&inline(), || Stage::completed(42_u32));
        assert_eq!(out.get(), Ok(42));
    }

    #[test]
    fn unwrap_holds_continuations_until_inner_finishes() {
        let mut event = Event::new();
        let inner = event.stage();
        let outer = spawn_flat_on(&inline(), move || inner);
        // The root ran already, but the inner stage is still pending: the
        // outer must be parked, not terminal.
        assert!(!outer.is_ready());

        let chained = outer.then(|v: u32| v + 1);
        assert!(!chained.is_ready());

        assert!(event.set(41));
        assert_eq!(chained.get(), Ok(42));
    }

    #[test]
    fn unwrap_forwards_inner_cancellation() {
        let out = spawn_flat_on(&inline(), || {
            Stage::<u32>::canceled(TaskError::AbandonedEvent)
        });
        assert!(out.is_canceled());
        assert_eq!(out.get(), Err(TaskError::AbandonedEvent));
    }

    #[test]
    fn and_then_unwraps_and_propagates_errors() {
        let ok = spawn_on(&inline(), || 6_u32).and_then(|v| Stage::completed(v * 7));
        assert_eq!(ok.get(), Ok(42));

        let failing = spawn_on(&inline(), || -> u32 { panic!("early") })
            .and_then(|v| Stage::completed(v + 1));
        assert_eq!(failing.get(), Err(TaskError::Panicked("early".to_string())));
    }

    #[test]
    fn and_then_stage_can_recover_from_errors() {
        let recovered = spawn_on(&inline(), || -> u32 { panic!("nope") })
            .and_then_stage(|parent| match parent.get() {
                Ok(v) => Stage::completed(v),
                Err(_) => Stage::completed(7_u32),
            });
        assert_eq!(recovered.get(), Ok(7));
    }

    #[test]
    fn panic_inside_continuation_cancels_the_child() {
        let child = spawn_on(&inline(), || 1_u32).then(|_| -> u32 { panic!("mid-chain") });
        assert!(child.is_canceled());
        let grandchild = child.then(|v| v + 1);
        assert_eq!(
            grandchild.get(),
            Err(TaskError::Panicked("mid-chain".to_string()))
        );
    }

    #[test]
    fn explicit_scheduler_is_used_for_the_child() {
        let fifo = Arc::new(crate::scheduler::FifoScheduler::new());
        let sched: SchedulerRef = fifo.clone();

        let chained = Stage::completed(1_u32).then_on(&sched, |v| v + 1);
        // The child sits in the fifo queue until someone drives it.
        assert!(!chained.is_ready());
        assert!(fifo.try_run_one_task());
        assert_eq!(chained.get(), Ok(2));
    }

    #[test]
    fn thread_scheduler_runs_detached_tasks() {
        let stage = spawn_on(&scheduler::thread_scheduler(), || 5_u32);
        assert_eq!(stage.get(), Ok(5));
    }
}
