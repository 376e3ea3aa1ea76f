use crate::error::TaskError;
use crate::scheduler::{self, SchedulerRef};
use crate::task::cell::{ExecFn, RawTask, TaskCell};
use std::sync::Arc;

/// Stage pinned to the creating scope: the task is joined when the handle
/// drops, so the spawned function never outlives the surrounding code.
///
/// Returned by [`local_spawn`]; not clonable.
pub struct LocalStage<T: Send + 'static> {
    cell: Arc<TaskCell<T>>,
    consumed: bool,
}

impl<T: Send + 'static> LocalStage<T> {
    pub fn is_ready(&self) -> bool {
        self.cell.core().ready()
    }

    pub fn is_canceled(&self) -> bool {
        self.cell.core().canceled()
    }

    pub fn wait(&self) {
        self.cell.core().wait();
    }

    /// Waits and moves the result out.
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    pub fn take(&mut self) -> Result<T, TaskError> {
        assert!(!self.consumed, "LocalStage result was already taken");
        self.cell.core().wait();
        self.consumed = true;
        self.cell.take_result()
    }

    /// Waits and returns the cancellation error, or `None` if the task
    /// completed with a value.
    pub fn error(&self) -> Option<TaskError> {
        self.cell.core().wait();
        self.cell.peek_error()
    }
}

impl<T: Send + 'static> Drop for LocalStage<T> {
    fn drop(&mut self) {
        self.cell.core().wait();
    }
}

/// Spawns `f` on `sched`, returning a scope-joined stage.
pub fn local_spawn_on<T, F>(sched: &SchedulerRef, f: F) -> LocalStage<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let exec: ExecFn<T> = Box::new(move |cell| cell.finish_with(f()));
    let cell = TaskCell::new(Some(sched), exec);
    let raw: Arc<dyn RawTask> = cell.clone() as Arc<dyn RawTask>;
    scheduler::schedule_task(sched, raw);
    LocalStage {
        cell,
        consumed: false,
    }
}

/// Spawns `f` on the default pool, returning a scope-joined stage.
pub fn local_spawn<T, F>(f: F) -> LocalStage<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    local_spawn_on(&scheduler::default_scheduler(), f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn take_returns_the_result() {
        let mut local = local_spawn_on(&scheduler::inline_scheduler(), || 8_u32);
        assert_eq!(local.take(), Ok(8));
    }

    #[test]
    fn drop_joins_the_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let observer = Arc::clone(&finished);
        {
            let _local = local_spawn_on(&scheduler::thread_scheduler(), move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                observer.store(true, Ordering::Release);
            });
        }
        // The scope exit waited for the task.
        assert!(finished.load(Ordering::Acquire));
    }

    #[test]
    fn canceled_local_stage_reports_its_error() {
        let local = local_spawn_on(&scheduler::inline_scheduler(), || -> u32 { panic!("halt") });
        assert!(local.is_canceled());
        assert_eq!(local.error(), Some(TaskError::Panicked("halt".to_string())));
    }

    #[test]
    #[should_panic(expected = "LocalStage result was already taken")]
    fn take_is_one_shot() {
        let mut local = local_spawn_on(&scheduler::inline_scheduler(), || 1_u32);
        let _ = local.take();
        let _ = local.take();
    }
}
