//! Change observers with explicit unsubscribe handles.
//!
//! Every subscription returns a [`Subscription`] that must be handed back to
//! [`Observers::unsubscribe`] when the listener's owner goes away. The live
//! count is exposed so teardown can be checked.

use std::fmt;

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(u64);

type Listener<T> = Box<dyn FnMut(&T)>;

/// Ordered list of listeners for change notifications of type `T`.
pub struct Observers<T> {
    listeners: Vec<(Subscription, Listener<T>)>,
    next: u64,
}

impl<T> Observers<T> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next: 1,
        }
    }

    /// Register a listener. Listeners are notified in subscription order.
    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) -> Subscription {
        let handle = Subscription(self.next);
        self.next += 1;
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// Remove a listener. Returns `false` if the handle was not live.
    pub fn unsubscribe(&mut self, handle: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(h, _)| *h != handle);
        self.listeners.len() != before
    }

    /// Notify every listener.
    pub fn notify(&mut self, change: &T) {
        for (_, listener) in &mut self.listeners {
            listener(change);
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
