/// A guard that executes a closure when it goes out of scope, whether by a
/// normal return, an early return, or a panic.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // Wrapped in an `Option` so the closure can be taken out on drop and is
    // only ever called once.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
