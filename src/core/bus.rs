//! Typed publish/subscribe event bus.
//!
//! The orchestrator owns one bus and hands an `Arc<EventBus>` to every
//! component that publishes or listens. Two ways to listen:
//! - `on`: synchronous handlers keyed by event kind, run inside `raise`
//! - `subscribe`: a broadcast receiver for async consumers

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{BuildEvent, EventKind};

/// Broadcast buffer size
const CHANNEL_CAPACITY: usize = 256;

/// Synchronous event handler
pub type Handler = Arc<dyn Fn(&BuildEvent) + Send + Sync>;

pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
    sender: broadcast::Sender<BuildEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            handlers: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Register a handler for one kind of event
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&BuildEvent) + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Publish an event to handlers and subscribers.
    ///
    /// Callable from any thread, including watcher callbacks.
    pub fn raise(&self, event: BuildEvent) {
        debug!(event = event.kind().as_str(), "Raising event");

        // Clone the handler list so handlers may register more handlers
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            handler(&event);
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Receive every event raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
