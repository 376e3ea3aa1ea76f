use crate::scheduler::RunHandle;
use crate::scheduler::pool::PoolShared;
use crate::utils::scope_guard::ScopeGuard;
use crate::wait::{self, TaskWaitHandle};
use crossbeam_deque::{Steal, Worker as LocalQueue};
use std::cell::RefCell;
use std::iter;
use std::sync::Arc;

/// Per-thread view of the pool a worker belongs to.
struct WorkerContext {
    shared: Arc<PoolShared>,
    local: LocalQueue<RunHandle>,
    index: usize,
    max_steal_retries: usize,
}

thread_local! {
    static CURRENT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

/// Body of a worker thread: installs the thread context and the cooperative
/// wait handler, then loops popping local work, draining the injector,
/// stealing from peers, and parking when everything is empty.
pub(super) fn run(
    shared: Arc<PoolShared>,
    local: LocalQueue<RunHandle>,
    index: usize,
    max_steal_retries: usize,
) {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(WorkerContext {
            shared: Arc::clone(&shared),
            local,
            index,
            max_steal_retries,
        });
    });
    // Dropping the context also drops the local queue; anything still queued
    // there is canceled as not-executed.
    let _teardown = ScopeGuard::new(|| {
        CURRENT.with(|current| {
            current.borrow_mut().take();
        });
    });
    let previous_handler = wait::set_thread_wait_handler(pool_wait_handler);
    let _restore = ScopeGuard::new(move || {
        wait::set_thread_wait_handler(previous_handler);
    });

    if let Some(hook) = shared.prerun.as_ref() {
        hook();
    }

    loop {
        // After shutdown the worker only finishes the task it already had in
        // hand; anything still queued is dropped and canceled.
        if shared.is_shutdown() {
            break;
        }
        if let Some(task) = next_task() {
            task.run();
            continue;
        }
        let key = shared.parker.snapshot();
        if shared.has_pending_work() || shared.is_shutdown() {
            continue;
        }
        tracing::trace!(worker = index, "parking");
        shared.parker.wait(key);
    }

    if let Some(hook) = shared.postrun.as_ref() {
        hook();
    }
}

/// Pops the next runnable task for the current worker thread, if any.
fn next_task() -> Option<RunHandle> {
    CURRENT.with(|current| {
        let ctx = current.borrow();
        let ctx = ctx.as_ref()?;
        find_task(ctx)
    })
}

/// Pushes a task onto the current thread's local queue when that thread is a
/// worker of `shared`'s pool; hands the task back otherwise.
pub(super) fn try_push_local(shared: &Arc<PoolShared>, task: RunHandle) -> Result<(), RunHandle> {
    CURRENT.with(|current| match current.borrow().as_ref() {
        Some(ctx) if Arc::ptr_eq(&ctx.shared, shared) => {
            ctx.local.push(task);
            Ok(())
        }
        _ => Err(task),
    })
}

fn find_task(ctx: &WorkerContext) -> Option<RunHandle> {
    // Local work first: it was pushed most recently, so caches are hot.
    ctx.local.pop().or_else(|| {
        // No local work: repeatedly try the injector, then one randomized
        // sweep over the other workers' queues, giving up after a bounded
        // number of contended rounds.
        iter::repeat_with(|| {
            ctx.shared
                .injector
                .steal_batch_and_pop(&ctx.local)
                .or_else(|| steal_from_peers(ctx))
        })
        .take(ctx.max_steal_retries)
        .find(|steal| !steal.is_retry())
        .and_then(|steal| steal.success())
    })
}

/// One steal sweep: visits the other workers' queues starting from a random
/// victim, taking the first task found.
fn steal_from_peers(ctx: &WorkerContext) -> Steal<RunHandle> {
    let n = ctx.shared.stealers.len();
    if n <= 1 {
        return Steal::Empty;
    }
    let start = fastrand::usize(..n);
    (0..n)
        .map(|offset| (start + offset) % n)
        .filter(|victim| *victim != ctx.index)
        .map(|victim| ctx.shared.stealers[victim].steal())
        .collect()
}

/// Cooperative wait handler installed on worker threads: instead of
/// sleeping, a worker blocked on a stage executes other scheduler work,
/// re-checking readiness between tasks. An `on_finish` continuation wakes
/// the pool when the awaited task completes on another thread.
fn pool_wait_handler(task: TaskWaitHandle<'_>) {
    let shared = CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|ctx| Arc::clone(&ctx.shared))
    });
    let Some(shared) = shared else {
        // Not a pool thread after all; sleep instead.
        wait::sleeping_wait_handler(task);
        return;
    };

    let waker = Arc::clone(&shared);
    task.on_finish(move || waker.notify());

    while !task.is_ready() {
        if let Some(next) = next_task() {
            next.run();
            continue;
        }
        let key = shared.parker.snapshot();
        if task.is_ready() || shared.has_pending_work() {
            continue;
        }
        shared.parker.wait(key);
    }
}
