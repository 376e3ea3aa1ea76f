//! Cascade: composable eager futures on a work-stealing thread pool.
//!
//! Computations are described as [`Stage`]s — values that complete later —
//! and composed into dependency graphs with continuations ([`Stage::then`],
//! [`Stage::and_then`]) and join combinators ([`when_all`], [`combine`]).
//! Root tasks are created with [`spawn`] and run on a scheduler; the default
//! is a process-wide work-stealing pool sized from `LIBASYNC_NUM_THREADS` or
//! the CPU count.
//!
//! # Example
//!
//! ```
//! let total = cascade::spawn(|| 6_u32)
//!     .then(|n| n * 7)
//!     .get()
//!     .unwrap();
//! assert_eq!(total, 42);
//! ```
//!
//! # Module structure
//!
//! - [`future`]: the handles user code holds and the join combinators
//! - [`scheduler`]: inline, thread-per-task, FIFO, and work-stealing pool
//!   schedulers
//! - [`wait`]: per-thread wait handlers (cooperative waiting on pool
//!   workers)
//! - [`error`]: the task cancellation error
//! - [`config`]: pool sizing

pub mod config;
pub mod error;
pub mod future;
pub mod scheduler;
pub mod wait;

pub(crate) mod task;
pub(crate) mod utils;

pub use error::TaskError;
pub use future::{
    Event, LocalStage, SharedStage, Stage, combine, local_spawn, local_spawn_on, spawn,
    spawn_flat, spawn_flat_on, spawn_on, when_all, when_all_iter,
};
pub use scheduler::{
    FifoScheduler, PoolBuilder, RunHandle, Scheduler, SchedulerRef, ThreadPoolScheduler,
    default_scheduler, inline_scheduler, thread_scheduler,
};
pub use wait::{TaskWaitHandle, WaitHandler, set_thread_wait_handler, with_thread_wait_handler};
