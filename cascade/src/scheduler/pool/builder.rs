use crate::scheduler::pool::ThreadPoolScheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bound on how many times a worker retries a failed steal sweep before
/// parking.
const MAX_STEAL_RETRIES: usize = 4;

pub(crate) type ThreadNameFn = Arc<dyn Fn() -> String + Send + Sync + 'static>;
pub(crate) type WorkerHook = Arc<dyn Fn() + Send + Sync + 'static>;

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));
    Arc::new(move || {
        let prev = counter.fetch_add(1, Ordering::Relaxed);
        format!("cascade-worker-{prev}")
    })
}

/// Configures a [`ThreadPoolScheduler`].
pub struct PoolBuilder {
    /// The number of worker threads.
    ///
    /// Defaults to `LIBASYNC_NUM_THREADS` when set, otherwise one worker per
    /// CPU core.
    pub(super) num_threads: Option<usize>,

    /// Name fn used for worker threads. The default yields names with
    /// monotonically increasing N, "cascade-worker-{N}".
    pub(super) thread_name: ThreadNameFn,

    pub(super) max_steal_retries: usize,

    /// Called once by each worker on entry, before it starts taking work.
    pub(super) prerun: Option<WorkerHook>,

    /// Called once by each worker on clean exit.
    pub(super) postrun: Option<WorkerHook>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            num_threads: None,
            thread_name: default_thread_name_fn(),
            max_steal_retries: MAX_STEAL_RETRIES,
            prerun: None,
            postrun: None,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `val` is 0.
    pub fn num_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "num_threads cannot be set to 0");
        self.num_threads = Some(val);
        self
    }

    /// Sets one fixed name for all worker threads.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = Arc::new(move || val.clone());
        self
    }

    /// Sets a function used to generate worker thread names.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = Arc::new(f);
        self
    }

    /// Sets how many failed steal sweeps a worker performs before parking.
    ///
    /// # Panics
    ///
    /// Panics if `val` is 0.
    pub fn max_steal_retries(mut self, val: usize) -> Self {
        assert!(val > 0, "max_steal_retries cannot be set to 0");
        self.max_steal_retries = val;
        self
    }

    /// Hook called once by each worker thread on entry, for thread naming,
    /// affinity pinning and the like.
    pub fn prerun<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.prerun = Some(Arc::new(f));
        self
    }

    /// Hook called once by each worker thread on clean exit.
    pub fn postrun<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.postrun = Some(Arc::new(f));
        self
    }

    /// Creates the configured pool and starts its workers.
    pub fn build(self) -> ThreadPoolScheduler {
        ThreadPoolScheduler::from_builder(self)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_are_numbered() {
        let name_fn = default_thread_name_fn();
        assert_eq!(name_fn(), "cascade-worker-0");
        assert_eq!(name_fn(), "cascade-worker-1");
    }

    #[test]
    #[should_panic(expected = "num_threads cannot be set to 0")]
    fn zero_threads_is_rejected() {
        let _ = PoolBuilder::new().num_threads(0);
    }
}
