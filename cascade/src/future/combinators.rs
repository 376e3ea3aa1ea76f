use crate::future::{Event, Stage};
use crate::scheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Joins two stages into one that completes when both parents are terminal,
/// yielding the parent handles themselves so the outcome of each can be
/// inspected.
///
/// The join completes even when parents are canceled; use [`combine`] for
/// value joins with error propagation.
pub fn when_all<A, B>(a: Stage<A>, b: Stage<B>) -> Stage<(Stage<A>, Stage<B>)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    struct Join<A: Send + 'static, B: Send + 'static> {
        remaining: AtomicUsize,
        left: Mutex<Option<Stage<A>>>,
        right: Mutex<Option<Stage<B>>>,
        event: Mutex<Option<Event<(Stage<A>, Stage<B>)>>>,
    }

    impl<A: Send + 'static, B: Send + 'static> Join<A, B> {
        /// Called once per parent; the last arrival fires the event.
        fn arrived(&self) {
            if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let event = self.event.lock().take().expect("join fired twice");
                let left = self.left.lock().take().expect("left join slot empty");
                let right = self.right.lock().take().expect("right join slot empty");
                event.set((left, right));
            }
        }
    }

    let mut event = Event::new();
    let out = event.stage();
    let join = Arc::new(Join {
        remaining: AtomicUsize::new(2),
        left: Mutex::new(None),
        right: Mutex::new(None),
        event: Mutex::new(Some(event)),
    });

    let inline = scheduler::inline_scheduler();
    let observer = Arc::clone(&join);
    let _ = a.then_stage_on(&inline, move |stage| {
        *observer.left.lock() = Some(stage);
        observer.arrived();
    });
    let observer = join;
    let _ = b.then_stage_on(&inline, move |stage| {
        *observer.right.lock() = Some(stage);
        observer.arrived();
    });

    out
}

/// Joins a homogeneous collection of stages, yielding the parent handles in
/// their original order. An empty input completes immediately.
pub fn when_all_iter<T, I>(stages: I) -> Stage<Vec<Stage<T>>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
{
    struct Join<T: Send + 'static> {
        remaining: AtomicUsize,
        slots: Mutex<Vec<Option<Stage<T>>>>,
        event: Mutex<Option<Event<Vec<Stage<T>>>>>,
    }

    let stages: Vec<Stage<T>> = stages.into_iter().collect();
    if stages.is_empty() {
        return Stage::completed(Vec::new());
    }

    let count = stages.len();
    let mut event = Event::new();
    let out = event.stage();
    let join = Arc::new(Join {
        remaining: AtomicUsize::new(count),
        slots: Mutex::new((0..count).map(|_| None).collect()),
        event: Mutex::new(Some(event)),
    });

    let inline = scheduler::inline_scheduler();
    for (index, stage) in stages.into_iter().enumerate() {
        let observer = Arc::clone(&join);
        let _ = stage.then_stage_on(&inline, move |stage| {
            observer.slots.lock()[index] = Some(stage);
            if observer.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let event = observer.event.lock().take().expect("join fired twice");
                let stages = observer
                    .slots
                    .lock()
                    .drain(..)
                    .map(|slot| slot.expect("join slot empty"))
                    .collect();
                event.set(stages);
            }
        });
    }

    out
}

/// Two-parent value join: completes with `f(a, b)` once both parents
/// completed. If either parent is canceled, the result is canceled with the
/// first canceled parent's error, checked in argument order.
pub fn combine<A, B, R, F>(a: Stage<A>, b: Stage<B>, f: F) -> Stage<R>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: FnOnce(A, B) -> R + Send + 'static,
{
    when_all(a, b).and_then(move |(a, b)| match a.get() {
        Err(err) => Stage::canceled(err),
        Ok(a) => match b.get() {
            Err(err) => Stage::canceled(err),
            Ok(b) => Stage::completed(f(a, b)),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::future::stage::spawn_on;
    use crate::scheduler::inline_scheduler;

    #[test]
    fn when_all_joins_mixed_types() {
        let numbers = spawn_on(&inline_scheduler(), || 7_usize);
        let text = spawn_on(&inline_scheduler(), || "x".to_string());

        let sum = when_all(numbers, text)
            .then(|(a, b)| a.get().unwrap() + b.get().unwrap().len());
        assert_eq!(sum.get(), Ok(8));
    }

    #[test]
    fn when_all_waits_for_the_slower_parent() {
        let mut gate = Event::new();
        let pending = gate.stage();
        let done = Stage::completed(1_u32);

        let joined = when_all(done, pending);
        assert!(!joined.is_ready());

        assert!(gate.set(2_u32));
        let (a, b) = joined.get().unwrap();
        assert_eq!(a.get(), Ok(1));
        assert_eq!(b.get(), Ok(2));
    }

    #[test]
    fn when_all_completes_even_with_canceled_parents() {
        let failing = Stage::<u32>::canceled(TaskError::AbandonedEvent);
        let fine = Stage::completed(5_u32);

        let (a, b) = when_all(failing, fine).get().unwrap();
        assert!(a.is_canceled());
        assert_eq!(b.get(), Ok(5));
    }

    #[test]
    fn when_all_iter_preserves_order() {
        let stages = (0..10_u32).map(Stage::completed);
        let results: Vec<u32> = when_all_iter(stages)
            .get()
            .unwrap()
            .into_iter()
            .map(|stage| stage.get().unwrap())
            .collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn when_all_iter_on_empty_input_is_immediate() {
        let joined = when_all_iter(Vec::<Stage<u32>>::new());
        assert!(joined.is_ready());
        assert!(joined.get().unwrap().is_empty());
    }

    #[test]
    fn combine_applies_the_function() {
        let a = spawn_on(&inline_scheduler(), || 7_usize);
        let b = spawn_on(&inline_scheduler(), || "x".to_string());
        assert_eq!(combine(a, b, |a, b| a + b.len()).get(), Ok(8));
    }

    #[test]
    fn combine_reports_the_first_parents_error_first() {
        let first_err = TaskError::Panicked("first".to_string());
        let second_err = TaskError::Panicked("second".to_string());

        let a = Stage::<u32>::canceled(first_err.clone());
        let b = Stage::<u32>::canceled(second_err);
        assert_eq!(combine(a, b, |a, b| a + b).get(), Err(first_err));
    }

    #[test]
    fn combine_propagates_the_second_parents_error() {
        let err = TaskError::Panicked("late".to_string());
        let a = Stage::completed(1_u32);
        let b = Stage::<u32>::canceled(err.clone());
        assert_eq!(combine(a, b, |a, b| a + b).get(), Err(err));
    }
}
