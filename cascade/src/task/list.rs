use crate::task::cell::RawTask;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node {
    task: Arc<dyn RawTask>,
    next: *mut Node,
}

/// Sentinel address marking the list as flushed and locked. Never
/// dereferenced.
fn closed() -> *mut Node {
    usize::MAX as *mut Node
}

/// Lock-free list of continuations attached to a task.
///
/// Children are pushed with a CAS while the list is open. The owning task's
/// terminal transition closes the list exactly once with a `swap` to the
/// sentinel; from that point every `try_add` fails and the caller dispatches
/// the child inline instead.
pub(crate) struct ContinuationList {
    head: AtomicPtr<Node>,
}

impl ContinuationList {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Appends a child, or returns it back if the list is already closed.
    pub(crate) fn try_add(&self, task: Arc<dyn RawTask>) -> Result<(), Arc<dyn RawTask>> {
        let node = Box::into_raw(Box::new(Node {
            task,
            next: ptr::null_mut(),
        }));
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head == closed() {
                // Safety: the node was just allocated above and never shared.
                let node = unsafe { Box::from_raw(node) };
                return Err(node.task);
            }
            // Safety: the node is not yet published; we still own it.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(current) => head = current,
            }
        }
    }

    /// Closes the list and hands every appended child to `visitor`, in
    /// registration order. Called exactly once, by the terminal transition of
    /// the owning task.
    pub(crate) fn flush_and_lock(&self, mut visitor: impl FnMut(Arc<dyn RawTask>)) {
        let head = self.head.swap(closed(), Ordering::AcqRel);
        if head == closed() {
            debug_assert!(false, "continuation list flushed twice");
            return;
        }

        // The chain is in push order (most recent first); reverse it so
        // children are delivered in the order they were registered.
        let mut reversed: *mut Node = ptr::null_mut();
        let mut current = head;
        while !current.is_null() {
            // Safety: after the swap this thread exclusively owns the chain.
            unsafe {
                let next = (*current).next;
                (*current).next = reversed;
                reversed = current;
                current = next;
            }
        }

        let mut current = reversed;
        while !current.is_null() {
            // Safety: nodes were allocated by `try_add` and are owned here.
            let node = unsafe { Box::from_raw(current) };
            current = node.next;
            visitor(node.task);
        }
    }
}

impl Drop for ContinuationList {
    fn drop(&mut self) {
        let mut current = self.head.load(Ordering::Relaxed);
        if current == closed() {
            return;
        }
        while !current.is_null() {
            // Safety: at drop time no other thread holds a reference.
            let node = unsafe { Box::from_raw(current) };
            current = node.next;
        }
    }
}

// Safety: the raw node pointers are only handed between threads through the
// atomic head, and the payload they carry is Send + Sync.
unsafe impl Send for ContinuationList {}
unsafe impl Sync for ContinuationList {}
