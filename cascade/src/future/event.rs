use crate::error::TaskError;
use crate::future::Stage;
use crate::task::cell::TaskCell;
use std::sync::Arc;

/// Producer-side handle: a task whose terminal state is set manually instead
/// of by running a function.
///
/// The paired [`Stage`] is retrievable exactly once through
/// [`stage`](Self::stage). Setting a value or an error succeeds for exactly
/// one caller; every later attempt returns `false`. Dropping an event that
/// was never set cancels the task with [`TaskError::AbandonedEvent`].
pub struct Event<T: Send + 'static> {
    cell: Arc<TaskCell<T>>,
}

impl<T: Send + 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            cell: TaskCell::new_event(),
        }
    }

    /// The stage observing this event.
    ///
    /// # Panics
    ///
    /// Panics when called a second time; the handle is single-consumer.
    pub fn stage(&mut self) -> Stage<T> {
        assert!(
            self.cell.core().claim_stage_handle(),
            "Event::stage() called twice"
        );
        Stage {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Completes the task with `value` and runs its continuations. Returns
    /// false if the event was already set.
    pub fn set(&self, value: T) -> bool {
        if !self.cell.core().try_lock() {
            return false;
        }
        self.cell.finish_with(value);
        true
    }

    /// Cancels the task with `err` and runs its continuations. Returns false
    /// if the event was already set.
    pub fn set_error(&self, err: TaskError) -> bool {
        if !self.cell.core().try_lock() {
            return false;
        }
        self.cell.cancel_base(err);
        true
    }
}

impl<T: Send + 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Event<T> {
    fn drop(&mut self) {
        // A racing `set` can still win; `set_error` settles it atomically.
        if !self.cell.core().ready() {
            let _ = self.set_error(TaskError::AbandonedEvent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Event<u32>: Send, Sync);

    #[test]
    fn set_completes_the_stage() {
        let mut event = Event::new();
        let stage = event.stage();
        assert!(!stage.is_ready());
        assert!(event.set(11_u32));
        assert_eq!(stage.get(), Ok(11));
    }

    #[test]
    fn only_the_first_set_wins() {
        let mut event = Event::new();
        let stage = event.stage();
        assert!(event.set(1_u32));
        assert!(!event.set(2));
        assert!(!event.set_error(TaskError::AbandonedEvent));
        assert_eq!(stage.get(), Ok(1));
    }

    #[test]
    fn set_error_cancels_the_stage() {
        let mut event = Event::<u32>::new();
        let stage = event.stage();
        assert!(event.set_error(TaskError::app(anyhow::anyhow!("manual"))));
        assert!(stage.is_canceled());
        assert!(stage.get().is_err());
    }

    #[test]
    fn dropping_an_unset_event_abandons_the_stage() {
        let mut event = Event::<u32>::new();
        let stage = event.stage();
        drop(event);
        assert!(stage.is_canceled());
        assert_eq!(stage.get(), Err(TaskError::AbandonedEvent));
    }

    #[test]
    fn dropping_a_set_event_leaves_the_value() {
        let mut event = Event::new();
        let stage = event.stage();
        assert!(event.set(3_u32));
        drop(event);
        assert_eq!(stage.get(), Ok(3));
    }

    #[test]
    #[should_panic(expected = "Event::stage() called twice")]
    fn stage_is_one_shot() {
        let mut event = Event::<u32>::new();
        let _first = event.stage();
        let _second = event.stage();
    }

    #[test]
    fn set_from_another_thread_wakes_a_waiter() {
        let mut event = Event::new();
        let stage = event.stage();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(event.set(27_u32));
        });
        assert_eq!(stage.get(), Ok(27));
        producer.join().unwrap();
    }
}
