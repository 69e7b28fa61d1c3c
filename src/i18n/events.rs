//! Typed language events.
//!
//! Handlers registered with `on` run synchronously, in registration order,
//! when an event is emitted. Async consumers can `subscribe` to a broadcast
//! channel carrying the same events.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageChangeEvent {
    pub previous_language: String,
    pub new_language: String,
    pub requested_language: Option<String>,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    /// The local preference was pushed to the server
    Local,
    /// The server preference was applied locally
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceSyncEvent {
    pub language: String,
    pub source: SyncSource,
    pub conflict_resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LanguageEvent {
    LanguageChanged(LanguageChangeEvent),
    FallbackUsed(LanguageChangeEvent),
    PreferenceSynced(PreferenceSyncEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageEventKind {
    LanguageChanged,
    FallbackUsed,
    PreferenceSynced,
}

impl LanguageEvent {
    pub fn kind(&self) -> LanguageEventKind {
        match self {
            LanguageEvent::LanguageChanged(_) => LanguageEventKind::LanguageChanged,
            LanguageEvent::FallbackUsed(_) => LanguageEventKind::FallbackUsed,
            LanguageEvent::PreferenceSynced(_) => LanguageEventKind::PreferenceSynced,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&LanguageEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    kind: LanguageEventKind,
    handler: EventHandler,
}

pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<Vec<Registration>>,
    sender: broadcast::Sender<LanguageEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub fn on(&self, kind: LanguageEventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(Registration { id, kind, handler });
        id
    }

    /// Returns false if the listener was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        let before = handlers.len();
        handlers.retain(|registration| registration.id != id);
        handlers.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LanguageEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LanguageEvent) {
        let kind = event.kind();
        // Handlers run without the lock so they may register or remove listeners
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|registration| registration.kind == kind)
            .map(|registration| registration.handler.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    pub fn listener_count(&self, kind: LanguageEventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|registration| registration.kind == kind)
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
