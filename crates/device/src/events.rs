//! Device event registry
//!
//! Handlers are registered per [`EventKind`] and invoked synchronously, in
//! registration order, on the thread that raised the event. Every handler has
//! returned before the triggering device call returns, so handlers must be
//! cheap and must not call back into the device that raised the event.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of device notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Device opened and interface claimed
    Connect,
    /// Device vanished from the bus during a transfer
    Disconnect,
    /// A kernel driver was detached to claim the interface
    Detach,
    /// Bytes were written to the device
    Data,
    /// Device closed
    Close,
}

/// A single notification delivered to handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub kind: EventKind,
    /// Payload for [`EventKind::Data`]; `None` for every other kind
    pub data: Option<Vec<u8>>,
}

impl DeviceEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, data: None }
    }

    pub fn data(bytes: &[u8]) -> Self {
        Self {
            kind: EventKind::Data,
            data: Some(bytes.to_vec()),
        }
    }
}

/// Registered event callback
pub type EventHandler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Registry of event handlers keyed by event kind
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// The handler list is snapshotted first, so a handler may register further
    /// handlers without deadlocking; those only see later events.
    pub fn emit(&self, event: &DeviceEvent) {
        let handlers = match self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind)
        {
            Some(list) => list.clone(),
            None => return,
        };

        for handler in handlers {
            handler(event);
        }
    }

    /// Emit a `Data` event, copying `bytes` only if someone is listening.
    pub fn emit_data(&self, bytes: &[u8]) {
        if self.handler_count(EventKind::Data) > 0 {
            self.emit(&DeviceEvent::data(bytes));
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}
