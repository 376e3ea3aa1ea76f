//! The work-stealing thread pool.
//!
//! Each worker owns a LIFO deque; tasks submitted from non-worker threads go
//! through a shared injector. Idle workers steal from random victims and
//! park on an eventcount when the whole pool is drained. A worker that
//! blocks on a stage runs other scheduler work instead of sleeping.

mod builder;
mod parker;
mod worker;

pub use builder::PoolBuilder;

use crate::scheduler::{RunHandle, Scheduler};
use builder::WorkerHook;
use crossbeam_deque::{Injector, Stealer, Worker as LocalQueue};
use parker::EventCount;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// State shared between the pool handle and its workers.
pub(crate) struct PoolShared {
    injector: Injector<RunHandle>,
    stealers: Vec<Stealer<RunHandle>>,
    parker: EventCount,
    shutdown: AtomicBool,
    prerun: Option<WorkerHook>,
    postrun: Option<WorkerHook>,
}

impl PoolShared {
    pub(super) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Whether any queue reachable by a sleeping worker still holds work.
    pub(super) fn has_pending_work(&self) -> bool {
        !self.injector.is_empty() || self.stealers.iter().any(|stealer| !stealer.is_empty())
    }

    pub(super) fn notify(&self) {
        self.parker.notify_all();
    }
}

/// Scheduler that runs tasks on a work-stealing pool of worker threads.
///
/// Dropping the pool shuts it down: workers finish the task in hand and
/// exit; tasks still queued are dropped, which cancels them with
/// [`TaskError::NotExecuted`](crate::TaskError::NotExecuted), so their
/// outstanding stages observe cancellation rather than hanging.
pub struct ThreadPoolScheduler {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPoolScheduler {
    /// Creates a pool with `num_threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> Self {
        PoolBuilder::new().num_threads(num_threads).build()
    }

    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    pub(super) fn from_builder(builder: PoolBuilder) -> Self {
        let num_threads = builder
            .num_threads
            .unwrap_or_else(crate::config::default_num_threads);

        let locals: Vec<LocalQueue<RunHandle>> =
            (0..num_threads).map(|_| LocalQueue::new_lifo()).collect();
        let stealers = locals.iter().map(LocalQueue::stealer).collect();

        let shared = Arc::new(PoolShared {
            injector: Injector::new(),
            stealers,
            parker: EventCount::new(),
            shutdown: AtomicBool::new(false),
            prerun: builder.prerun,
            postrun: builder.postrun,
        });

        let workers = locals
            .into_iter()
            .enumerate()
            .map(|(index, local)| {
                let shared = Arc::clone(&shared);
                let max_steal_retries = builder.max_steal_retries;
                thread::Builder::new()
                    .name((builder.thread_name)())
                    .spawn(move || worker::run(shared, local, index, max_steal_retries))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        tracing::debug!(num_threads, "thread pool started");
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn schedule(&self, task: RunHandle) {
        // From one of this pool's own workers the task goes onto that
        // worker's deque; from any other thread it goes through the injector.
        match worker::try_push_local(&self.shared, task) {
            Ok(()) => {}
            Err(task) => self.shared.injector.push(task),
        }
        self.shared.notify();
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }
        // The injector is dropped with the last reference to the shared
        // state, canceling any tasks still queued there.
        tracing::debug!("thread pool shut down");
    }
}

impl fmt::Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolScheduler")
            .field("num_threads", &self.shared.stealers.len())
            .field("shutdown", &self.shared.is_shutdown())
            .finish()
    }
}
