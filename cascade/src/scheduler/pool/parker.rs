use parking_lot::{Condvar, Mutex};

/// Eventcount-style parking spot shared by all workers of a pool.
///
/// A worker snapshots the epoch, re-checks its queues, and only then waits;
/// producers bump the epoch under the lock before notifying. A wakeup that
/// lands between the snapshot and the wait is therefore never lost: the
/// stale key makes `wait` return immediately.
pub(super) struct EventCount {
    epoch: Mutex<u64>,
    condvar: Condvar,
}

impl EventCount {
    pub(super) fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    pub(super) fn snapshot(&self) -> u64 {
        *self.epoch.lock()
    }

    pub(super) fn notify_all(&self) {
        {
            let mut epoch = self.epoch.lock();
            *epoch += 1;
        }
        self.condvar.notify_all();
    }

    /// Blocks while the epoch still equals `key`.
    pub(super) fn wait(&self, key: u64) {
        let mut epoch = self.epoch.lock();
        while *epoch == key {
            self.condvar.wait(&mut epoch);
        }
    }
}
