//! Listener registry and event dispatch
//!
//! Listeners are registered per [`EventKind`] and called in registration
//! order on a dedicated dispatcher task. The navigation actor only ever
//! enqueues events, so a slow listener delays other listeners but never
//! location processing. When the dispatch queue is full the event is
//! dropped for listeners (the broadcast stream still carries it).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::event::{EventKind, NavigationEvent};

/// Receives navigation events
pub trait NavigationListener: Send + Sync + 'static {
    fn on_event(&self, event: &NavigationEvent);
}

impl<F> NavigationListener for F
where
    F: Fn(&NavigationEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &NavigationEvent) {
        self(event)
    }
}

/// Handle identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Registration = (ListenerId, Arc<dyn NavigationListener>);

/// Ordered listeners per event kind
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventKind, Vec<Registration>>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind
    pub fn add(&self, kind: EventKind, listener: Arc<dyn NavigationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        debug!(%id, %kind, "Listener registered");
        id
    }

    /// Unregister a listener, handing it back to the caller
    pub fn remove(&self, id: ListenerId) -> Option<Arc<dyn NavigationListener>> {
        let mut listeners = self.listeners.write();
        for registrations in listeners.values_mut() {
            if let Some(pos) = registrations.iter().position(|(rid, _)| *rid == id) {
                let (_, listener) = registrations.remove(pos);
                debug!(%id, "Listener removed");
                return Some(listener);
            }
        }
        None
    }

    /// Whether anything listens for `kind`
    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners
            .read()
            .get(&kind)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    /// Number of registrations across all kinds
    pub fn len(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener registered for the event's kind, in order
    ///
    /// The registry lock is released before any listener runs, so
    /// listeners may add or remove registrations.
    pub fn dispatch(&self, event: &NavigationEvent) {
        let snapshot: Vec<Arc<dyn NavigationListener>> = match self.listeners.read().get(&event.kind()) {
            Some(registrations) => registrations.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

/// Fans events out to the broadcast stream and the listener task
#[derive(Debug)]
pub struct EventDispatcher {
    registry: Arc<ListenerRegistry>,
    broadcast_tx: broadcast::Sender<NavigationEvent>,
    listener_tx: mpsc::Sender<NavigationEvent>,
}

/// Consumer side of the listener queue; run it on its own task
#[derive(Debug)]
pub struct ListenerTask {
    registry: Arc<ListenerRegistry>,
    events: mpsc::Receiver<NavigationEvent>,
}

impl ListenerTask {
    /// Dispatch queued events until the dispatcher is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.registry.dispatch(&event);
        }
        debug!("Listener dispatcher stopped");
    }

    /// Spawn onto the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl EventDispatcher {
    /// Create the dispatcher and the task feeding its listeners
    pub fn new(registry: Arc<ListenerRegistry>, capacity: usize) -> (Self, ListenerTask) {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        let (listener_tx, events) = mpsc::channel(capacity);

        let task = ListenerTask {
            registry: Arc::clone(&registry),
            events,
        };
        let dispatcher = Self {
            registry,
            broadcast_tx,
            listener_tx,
        };
        (dispatcher, task)
    }

    /// Sender side of the raw event stream
    pub fn broadcast_sender(&self) -> broadcast::Sender<NavigationEvent> {
        self.broadcast_tx.clone()
    }

    /// Another receiver of the raw event stream
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Publish an event without waiting on any consumer
    pub fn publish(&self, event: NavigationEvent) {
        let kind = event.kind();
        trace!(%kind, "Publishing event");

        if self.registry.has_listeners(kind) {
            match self.listener_tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%kind, "Listener queue full, dropping event for listeners");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(%kind, "Listener task gone, dropping event");
                }
            }
        }

        // No receivers is fine
        let _ = self.broadcast_tx.send(event);
    }
}
