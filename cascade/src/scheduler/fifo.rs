use crate::scheduler::{RunHandle, Scheduler};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A passive queue scheduler: `schedule` only enqueues, and some thread must
/// drive execution through [`try_run_one_task`](Self::try_run_one_task) or
/// [`run_all_tasks`](Self::run_all_tasks). Both adding and running are
/// thread-safe.
///
/// Dropping the scheduler drops any tasks still queued, canceling them as
/// not-executed.
#[derive(Debug, Default)]
pub struct FifoScheduler {
    queue: Mutex<VecDeque<RunHandle>>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Runs one queued task. Returns false if the queue was empty.
    pub fn try_run_one_task(&self) -> bool {
        // The lock is released before running so the task can re-enter the
        // scheduler.
        let task = self.queue.lock().pop_front();
        match task {
            Some(task) => {
                task.run();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves.
    pub fn run_all_tasks(&self) {
        while self.try_run_one_task() {}
    }
}

impl Scheduler for FifoScheduler {
    fn schedule(&self, task: RunHandle) {
        self.queue.lock().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(FifoScheduler: Send, Sync);

    #[test]
    fn empty_queue_runs_nothing() {
        let fifo = FifoScheduler::new();
        assert!(!fifo.try_run_one_task());
    }
}
