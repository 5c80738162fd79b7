//! Cross-thread access to protocol state.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// State shared between the event-processing thread and other threads.
///
/// The protocol logic itself takes no locks. Code running outside the event thread
/// (a UI task, a button handler) must go through this wrapper.
#[derive(Debug, Default)]
pub struct SharedStack<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedStack<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        SharedStack {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Acquire the lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

impl<T> Clone for SharedStack<T> {
    fn clone(&self) -> Self {
        SharedStack {
            inner: Arc::clone(&self.inner),
        }
    }
}
