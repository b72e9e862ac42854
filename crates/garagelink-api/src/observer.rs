// ── Ordered observer lists ──
//
// Handlers are invoked synchronously, in registration order, on the task
// that produced the event. Registration is additive and never replaces an
// earlier handler.

use std::sync::{Arc, RwLock};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered, append-only list of event handlers.
pub struct Observers<T: ?Sized> {
    handlers: RwLock<Vec<Handler<T>>>,
}

impl<T: ?Sized> Observers<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Append a handler. It will run after every handler registered before it.
    pub fn register<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.push(Arc::new(handler));
    }

    /// Invoke every handler with `event`.
    ///
    /// The list is snapshotted first, so a handler may register further
    /// handlers without deadlocking; those only see later events.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
