use crate::error::TaskError;
use crate::scheduler::{self, Scheduler, SchedulerRef};
use crate::task::list::ContinuationList;
use crate::task::state::{State, TaskState};
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// The boxed execution closure stored in a task's function slot. It receives
/// the owning cell so it can store the result and drive the terminal
/// transition.
pub(crate) type ExecFn<T> = Box<dyn FnOnce(&Arc<TaskCell<T>>) + Send>;

/// The type-erased face of a task, as seen by schedulers and continuation
/// lists: it can be run once, canceled, and queried through its core.
pub(crate) trait RawTask: Send + Sync + 'static {
    /// Invokes the task's function. Reached at most once, through the single
    /// run handle the scheduler owns. A panic escaping the function is
    /// converted into cancellation and never propagates further.
    fn run(self: Arc<Self>);

    /// Cancels a task that will never run, dropping its unused function.
    fn cancel(self: Arc<Self>, err: TaskError);

    fn core(&self) -> &TaskCore;
}

/// The type-generic head of every task: state word, continuation list, the
/// scheduler captured at creation, and the event one-shot flag.
///
/// The scheduler reference is weak: tasks must not keep their scheduler
/// alive, or a pool whose queues own tasks pointing back at it could never
/// be dropped. A task that outlives its scheduler falls back to inline
/// dispatch.
pub(crate) struct TaskCore {
    state: State,
    continuations: ContinuationList,
    sched: Option<Weak<dyn Scheduler>>,
    got_stage: AtomicBool,
}

impl TaskCore {
    fn new(sched: Option<&SchedulerRef>) -> Self {
        Self {
            state: State::new(),
            continuations: ContinuationList::new(),
            sched: sched.map(Arc::downgrade),
            got_stage: AtomicBool::new(false),
        }
    }

    fn new_terminal(state: TaskState) -> Self {
        Self {
            state: State::new_terminal(state),
            continuations: ContinuationList::new(),
            sched: None,
            got_stage: AtomicBool::new(false),
        }
    }

    pub(crate) fn ready(&self) -> bool {
        self.state.load_acquire().is_finished()
    }

    pub(crate) fn canceled(&self) -> bool {
        self.state.load_acquire() == TaskState::Canceled
    }

    /// The scheduler this task's continuations inherit when created without
    /// an explicit one. Falls back to the inline scheduler when the task has
    /// none, or when its scheduler has already been dropped.
    pub(crate) fn sched_or_inline(&self) -> SchedulerRef {
        self.sched
            .as_ref()
            .and_then(Weak::upgrade)
            .unwrap_or_else(scheduler::inline_scheduler)
    }

    /// Claims the Pending state for an event setter.
    pub(crate) fn try_lock(&self) -> bool {
        self.state.try_lock()
    }

    /// Claims the one-shot right to hand out the stage handle of an event
    /// task.
    pub(crate) fn claim_stage_handle(&self) -> bool {
        !self.got_stage.swap(true, Ordering::Relaxed)
    }

    /// Registers a continuation. If the task already finished and the list is
    /// closed, the child is dispatched inline instead; the fence makes the
    /// finished task's slot visible before the child can read it.
    pub(crate) fn add_continuation(&self, cont: Arc<dyn RawTask>) {
        let cont = if !self.state.load_relaxed().is_finished() {
            match self.continuations.try_add(cont) {
                Ok(()) => return,
                Err(cont) => cont,
            }
        } else {
            cont
        };

        atomic::fence(Ordering::Acquire);
        dispatch(cont);
    }

    /// Runs all continuations after the terminal transition, closing the list
    /// against further appends.
    pub(crate) fn flush_continuations(&self) {
        self.continuations.flush_and_lock(dispatch);
    }

    /// Blocks until the task reaches a terminal state, via the calling
    /// thread's wait handler.
    pub(crate) fn wait(&self) -> TaskState {
        let state = self.state.load_acquire();
        if state.is_finished() {
            return state;
        }
        crate::wait::wait_for_task(self);
        self.state.load_acquire()
    }
}

/// Hands a continuation to its own scheduler, the one captured when it was
/// created.
fn dispatch(cont: Arc<dyn RawTask>) {
    let sched = cont.core().sched_or_inline();
    scheduler::schedule_task(&sched, cont);
}

/// Result slot contents. Exactly one of `Value`/`Error` is live once the
/// state is terminal; `Empty` otherwise, and again after the single consumer
/// moved the value out.
pub(crate) enum Slot<T> {
    Empty,
    Value(T),
    Error(TaskError),
}

/// A task: one node in the dependency graph.
///
/// The function slot is consumed exactly once, by the runner (or dropped by
/// cancellation). The result slot is written only by the actor driving the
/// terminal transition, strictly before the state is published with
/// `Release`; every reader loads the state with `Acquire` first.
pub(crate) struct TaskCell<T> {
    core: TaskCore,
    func: UnsafeCell<Option<ExecFn<T>>>,
    slot: UnsafeCell<Slot<T>>,
}

// Safety: the unsafe cells are only touched under the task protocol — the
// function slot by the unique runner, the result slot by the unique driver
// before the Release publish and by handles after an Acquire load of a
// terminal state. `T` itself only ever moves between threads.
unsafe impl<T: Send> Send for TaskCell<T> {}
unsafe impl<T: Send> Sync for TaskCell<T> {}

impl<T: Send + 'static> TaskCell<T> {
    /// A computed task: holds a function to run later.
    pub(crate) fn new(sched: Option<&SchedulerRef>, exec: ExecFn<T>) -> Arc<Self> {
        Arc::new(Self {
            core: TaskCore::new(sched),
            func: UnsafeCell::new(Some(exec)),
            slot: UnsafeCell::new(Slot::Empty),
        })
    }

    /// An event task: no function, finished externally through `set`.
    pub(crate) fn new_event() -> Arc<Self> {
        Arc::new(Self {
            core: TaskCore::new(None),
            func: UnsafeCell::new(None),
            slot: UnsafeCell::new(Slot::Empty),
        })
    }

    /// A pre-completed literal.
    pub(crate) fn new_completed(value: T) -> Arc<Self> {
        Arc::new(Self {
            core: TaskCore::new_terminal(TaskState::Completed),
            func: UnsafeCell::new(None),
            slot: UnsafeCell::new(Slot::Value(value)),
        })
    }

    /// A pre-canceled literal.
    pub(crate) fn new_canceled(err: TaskError) -> Arc<Self> {
        Arc::new(Self {
            core: TaskCore::new_terminal(TaskState::Canceled),
            func: UnsafeCell::new(None),
            slot: UnsafeCell::new(Slot::Error(err)),
        })
    }

    pub(crate) fn core(&self) -> &TaskCore {
        &self.core
    }

    /// Stores the result value. The caller holds the exclusive drive right
    /// and publishes the terminal state afterwards.
    fn set_value(&self, value: T) {
        // Safety: pre-publish writes are exclusive to the driving actor.
        unsafe { *self.slot.get() = Slot::Value(value) };
    }

    fn set_error(&self, err: TaskError) {
        // Safety: as in `set_value`.
        unsafe { *self.slot.get() = Slot::Error(err) };
    }

    /// Publishes `Completed` and runs the continuations.
    pub(crate) fn finish(&self) {
        self.core.state.publish(TaskState::Completed);
        self.core.flush_continuations();
    }

    pub(crate) fn finish_with(&self, value: T) {
        self.set_value(value);
        self.finish();
    }

    /// Cancels without touching the function slot: the function was already
    /// consumed (or never existed). Publishes `Canceled` and runs the
    /// continuations.
    pub(crate) fn cancel_base(&self, err: TaskError) {
        self.set_error(err);
        self.core.state.publish(TaskState::Canceled);
        self.core.flush_continuations();
    }

    /// Marks the task as awaiting an inner stage.
    pub(crate) fn transition_unwrapped(&self) {
        self.core.state.set_unwrapped();
    }

    /// Moves the result out. The calling handle holds the unique consumption
    /// right for this cell; the task must already be terminal.
    pub(crate) fn take_result(&self) -> Result<T, TaskError> {
        let state = self.core.state.load_acquire();
        debug_assert!(state.is_finished(), "result taken before the task finished");
        // Safety: a terminal state was observed with Acquire, and no other
        // consumer exists for this cell.
        let slot = unsafe { &mut *self.slot.get() };
        match std::mem::replace(slot, Slot::Empty) {
            Slot::Value(value) => Ok(value),
            Slot::Error(err) => Err(err),
            Slot::Empty => panic!("task result was already consumed"),
        }
    }

    /// Borrows the result for shared handles. The task must already be
    /// terminal; errors are cloned out.
    pub(crate) fn result_ref(&self) -> Result<&T, TaskError> {
        let state = self.core.state.load_acquire();
        debug_assert!(state.is_finished(), "result read before the task finished");
        // Safety: after the terminal publish the slot is never written again.
        match unsafe { &*self.slot.get() } {
            Slot::Value(value) => Ok(value),
            Slot::Error(err) => Err(err.clone()),
            Slot::Empty => panic!("task result was already consumed"),
        }
    }

    /// The cancellation error, if the task is canceled.
    pub(crate) fn peek_error(&self) -> Option<TaskError> {
        if self.core.state.load_acquire() != TaskState::Canceled {
            return None;
        }
        // Safety: terminal state observed with Acquire; shared read only.
        match unsafe { &*self.slot.get() } {
            Slot::Error(err) => Some(err.clone()),
            _ => None,
        }
    }
}

impl<T: Send + 'static> RawTask for TaskCell<T> {
    fn run(self: Arc<Self>) {
        // Safety: only the single run handle reaches here, at most once.
        let func = unsafe { (*self.func.get()).take() };
        let Some(func) = func else {
            debug_assert!(false, "task ran without a function");
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| func(&self))) {
            match self.core.state.load_relaxed() {
                // The body panicked after its result was published, or after
                // it handed completion over to an inner stage; in both cases
                // the terminal transition is no longer ours to drive.
                state if state.is_finished() => {
                    tracing::error!("task panicked after completing");
                }
                TaskState::Unwrapped => {
                    tracing::error!("task panicked after unwrapping");
                }
                _ => self.cancel_base(TaskError::from_panic(payload)),
            }
        }
    }

    fn cancel(self: Arc<Self>, err: TaskError) {
        // The function will never run; drop it before publishing the error.
        // Safety: the run handle is the only actor touching the function slot
        // and it is consumed by this call.
        drop(unsafe { (*self.func.get()).take() });
        self.cancel_base(err);
    }

    fn core(&self) -> &TaskCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TaskCell<u32>: Send, Sync);
    assert_impl_all!(TaskCore: Send, Sync);

    #[test]
    fn literal_cells_are_terminal() {
        let completed = TaskCell::new_completed(5_u32);
        assert!(completed.core().ready());
        assert!(!completed.core().canceled());
        assert_eq!(completed.take_result(), Ok(5));

        let canceled = TaskCell::<u32>::new_canceled(TaskError::AbandonedEvent);
        assert!(canceled.core().canceled());
        assert_eq!(canceled.peek_error(), Some(TaskError::AbandonedEvent));
    }

    #[test]
    fn run_stores_the_result() {
        let cell = TaskCell::new(None, Box::new(|cell: &Arc<TaskCell<u32>>| {
            cell.finish_with(7);
        }));
        let raw: Arc<dyn RawTask> = cell.clone();
        raw.run();
        assert!(cell.core().ready());
        assert_eq!(cell.take_result(), Ok(7));
    }

    #[test]
    fn run_converts_a_panic_into_cancellation() {
        let cell: Arc<TaskCell<u32>> = TaskCell::new(None, Box::new(|_| panic!("exploded")));
        let raw: Arc<dyn RawTask> = cell.clone();
        raw.run();
        assert!(cell.core().canceled());
        assert_eq!(
            cell.peek_error(),
            Some(TaskError::Panicked("exploded".to_string()))
        );
    }

    #[test]
    fn cancel_drops_the_function_unused() {
        let cell: Arc<TaskCell<u32>> =
            TaskCell::new(None, Box::new(|_| panic!("must not run")));
        let raw: Arc<dyn RawTask> = cell.clone();
        raw.cancel(TaskError::NotExecuted);
        assert!(cell.core().canceled());
        assert_eq!(cell.peek_error(), Some(TaskError::NotExecuted));
    }

    #[test]
    fn event_lock_is_single_winner() {
        let cell = TaskCell::<u32>::new_event();
        assert!(cell.core().try_lock());
        assert!(!cell.core().try_lock());
        cell.finish_with(3);
        assert!(cell.core().ready());
    }

    #[test]
    fn stage_handle_claim_is_one_shot() {
        let cell = TaskCell::<u32>::new_event();
        assert!(cell.core().claim_stage_handle());
        assert!(!cell.core().claim_stage_handle());
    }
}
