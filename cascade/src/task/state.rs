use std::sync::atomic::{AtomicU8, Ordering};

/// Task states. Transitions are monotone: `Pending` is left exactly once,
/// `Completed` and `Canceled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TaskState {
    /// The task has not produced a result yet.
    Pending = 0,
    /// Claimed by an event setter to prevent a double set.
    Locked = 1,
    /// The task's function returned an inner stage; the terminal transition
    /// is deferred until that stage finishes.
    Unwrapped = 2,
    /// A result is available.
    Completed = 3,
    /// An error is available.
    Canceled = 4,
}

impl TaskState {
    pub(crate) fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Canceled)
    }

    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Locked,
            2 => TaskState::Unwrapped,
            3 => TaskState::Completed,
            4 => TaskState::Canceled,
            _ => unreachable!("invalid task state: {value}"),
        }
    }
}

/// The atomic state word at the head of every task.
///
/// Result and error slots are written before the terminal state is published
/// with `Release`; readers must observe a terminal state with `Acquire`
/// before touching a slot.
#[derive(Debug)]
pub(crate) struct State(AtomicU8);

impl State {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TaskState::Pending as u8))
    }

    /// Starts directly in a terminal state, for pre-completed literals that
    /// are never shared while being built.
    pub(crate) fn new_terminal(state: TaskState) -> Self {
        debug_assert!(state.is_finished());
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load_acquire(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn load_relaxed(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Publishes a terminal state. The caller must have finished writing the
    /// corresponding slot.
    pub(crate) fn publish(&self, state: TaskState) {
        debug_assert!(state.is_finished());
        self.0.store(state as u8, Ordering::Release);
    }

    /// Claims the right to drive the task out of `Pending`. Used by event
    /// setters; at most one claim succeeds.
    pub(crate) fn try_lock(&self) -> bool {
        self.0
            .compare_exchange(
                TaskState::Pending as u8,
                TaskState::Locked as u8,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Marks the task as awaiting an inner stage. Only the unique runner
    /// reaches this, so a plain store suffices.
    pub(crate) fn set_unwrapped(&self) {
        debug_assert_eq!(self.load_relaxed(), TaskState::Pending);
        self.0.store(TaskState::Unwrapped as u8, Ordering::Relaxed);
    }
}
