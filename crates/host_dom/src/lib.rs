//! Browser-like host surface: window-level event broadcast, custom element
//! registry, document tree, and embedded frames with origin-scoped delivery.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::sync::broadcast;

use shared::protocol::ProtocolMessage;

pub mod document;
pub mod frame;
pub mod registry;

pub use document::{Document, ElementAttributes, ElementHandle, HostElement};
pub use frame::{EmbeddedFrame, SentFrame};
pub use registry::{ElementFactory, ElementRegistry};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
}

/// Window-level events. The window is a broadcast medium: every subscriber
/// observes every event, with no ordering guarantee between subscribers.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Message(ProtocolMessage),
    KeyDown(Key),
}

pub struct HostWindow {
    weak_self: Weak<HostWindow>,
    events: broadcast::Sender<HostEvent>,
    registry: ElementRegistry,
    document: Document,
}

impl HostWindow {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            events,
            registry: ElementRegistry::new(),
            document: Document::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Broadcast a protocol message to every window listener. A window with
    /// no listeners swallows the message, as a real one would.
    pub fn post_message(&self, message: ProtocolMessage) {
        let _ = self.events.send(HostEvent::Message(message));
    }

    pub fn dispatch_key(&self, key: Key) {
        let _ = self.events.send(HostEvent::KeyDown(key));
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// One visual-frame tick.
    pub async fn next_frame(&self) {
        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    /// Install an element definition unless the tag is already claimed.
    /// Returns whether this call installed the definition. A second attempt
    /// is a no-op that leaves the first definition active; it never panics
    /// and never replaces. Installing a definition upgrades any placeholder
    /// elements already sitting in the document under the tag and resolves
    /// pending `when_defined` futures.
    pub fn register_if_absent(&self, tag: &str, factory: ElementFactory) -> bool {
        if !self.registry.install(tag, factory.clone()) {
            return false;
        }
        if let Some(window) = self.weak_self.upgrade() {
            self.document.upgrade_matching(tag, &window, &factory);
        }
        self.registry.mark_defined(tag);
        true
    }

    /// Resolves once the tag has a definition; immediately if it already
    /// does. A tag that is never defined never resolves, and callers accept
    /// abandonment.
    pub async fn when_defined(&self, tag: &str) {
        self.registry.when_defined(tag).await;
    }

    /// Create an element for `tag`: upgraded when the tag is defined,
    /// otherwise a placeholder that upgrades in place once a definition
    /// lands. The element is not attached until appended to the document.
    pub fn create_element(&self, tag: &str) -> ElementHandle {
        match (self.registry.factory(tag), self.weak_self.upgrade()) {
            (Some(factory), Some(window)) => ElementHandle::Upgraded(factory(window)),
            _ => ElementHandle::Placeholder {
                tag: tag.to_string(),
            },
        }
    }
}

/// Access to the hosting context. Widgets are constructed against this seam
/// so running without a window (tests, server-side rendering) is an explicit,
/// detectable condition instead of a crash.
pub trait HostEnvironment: Send + Sync {
    fn window(&self) -> Option<Arc<HostWindow>>;
}

pub struct BrowserEnvironment {
    window: Arc<HostWindow>,
}

impl BrowserEnvironment {
    pub fn new(window: Arc<HostWindow>) -> Self {
        Self { window }
    }
}

impl HostEnvironment for BrowserEnvironment {
    fn window(&self) -> Option<Arc<HostWindow>> {
        Some(Arc::clone(&self.window))
    }
}

/// No window available. Construction of anything window-bound must fail.
pub struct HeadlessEnvironment;

impl HostEnvironment for HeadlessEnvironment {
    fn window(&self) -> Option<Arc<HostWindow>> {
        None
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
