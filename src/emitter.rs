//! A small typed event emitter.
//!
//! Listeners are registered per event kind and run synchronously, in
//! registration order, on the task that emits the event.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An event that can be dispatched through an [`EventEmitter`]
pub trait Event: Send + Sync + 'static {
    /// Discriminant used to select listeners
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The kind of this event
    fn kind(&self) -> Self::Kind;
}

/// Handle returned on registration, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E: Event> {
    id: ListenerId,
    kind: E::Kind,
    once: bool,
    listener: Listener<E>,
}

/// Typed publish/subscribe hub
pub struct EventEmitter<E: Event> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Entry<E>>>,
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.lock().len())
            .finish()
    }
}

impl<E: Event> EventEmitter<E> {
    /// Create an emitter without listeners
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for every event of the given kind
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(listener))
    }

    /// Register a listener that is removed after its first invocation
    pub fn once<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: E::Kind, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|entry| !(entry.id == id && entry.kind == kind));
        listeners.len() != before
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.lock().iter().filter(|entry| entry.kind == kind).count()
    }

    /// Dispatch an event to all listeners of its kind.
    ///
    /// The listener table is not locked while listeners run, so a listener
    /// may register or remove listeners (including itself).
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let targets: Vec<Listener<E>> = {
            let mut listeners = self.lock();
            let targets = listeners
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| Arc::clone(&entry.listener))
                .collect();
            listeners.retain(|entry| !(entry.once && entry.kind == kind));
            targets
        };

        for listener in targets {
            listener(event);
        }
    }

    fn register(&self, kind: E::Kind, once: bool, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            kind,
            once,
            listener,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<E>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
