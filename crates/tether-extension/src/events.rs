//! Registerable event lists.
//!
//! Handlers are invoked on a snapshot of the list taken under the lock, so
//! a handler may register further handlers without deadlocking and the
//! list is never mutated while it is being iterated.

use std::sync::Arc;

use parking_lot::Mutex;

type EventHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of event handlers for events carrying a `T`.
pub struct Event<T> {
    handlers: Mutex<Vec<EventHandler<T>>>,
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the list.
    pub fn register(&self, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    /// Invokes every registered handler in registration order.
    pub fn dispatch(&self, args: &T) {
        let snapshot: Vec<_> = self.handlers.lock().clone();
        for handler in snapshot {
            handler(args);
        }
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_in_registration_order() {
        let event: Event<u32> = Event::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            event.register(move |value| seen.lock().push((i, *value)));
        }
        event.dispatch(&7);

        assert_eq!(&*seen.lock(), &[(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_handler_may_register_reentrantly() {
        let event: Arc<Event<()>> = Arc::new(Event::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_event = Arc::clone(&event);
        let inner_count = Arc::clone(&count);
        event.register(move |_| {
            let count = Arc::clone(&inner_count);
            inner_event.register(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        });

        event.dispatch(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        event.dispatch(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
