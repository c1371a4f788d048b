use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

const DELIVERY_CHANNEL_CAPACITY: usize = 64;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A message handed to the frame's content context. Every attempt is
/// recorded, delivered or not, so the delivery policy is observable.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub body: serde_json::Value,
    pub target_origin: String,
    pub delivered: bool,
}

/// Stand-in for an embedded cross-origin frame. Until `navigate` the frame
/// has no content context and nothing can be delivered to it. Delivery is
/// origin-scoped: the target origin must match the navigated origin exactly;
/// a wildcard target never matches.
pub struct EmbeddedFrame {
    origin: Mutex<Option<String>>,
    sent: Mutex<Vec<SentFrame>>,
    delivered: broadcast::Sender<serde_json::Value>,
}

impl Default for EmbeddedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedFrame {
    pub fn new() -> Self {
        let (delivered, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);
        Self {
            origin: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            delivered,
        }
    }

    /// Point the frame at `url`, establishing its content origin.
    pub fn navigate(&self, url: &Url) {
        let origin = url.origin().ascii_serialization();
        debug!(%origin, "frame navigated");
        *locked(&self.origin) = Some(origin);
    }

    pub fn is_reachable(&self) -> bool {
        locked(&self.origin).is_some()
    }

    pub fn origin(&self) -> Option<String> {
        locked(&self.origin).clone()
    }

    /// Deliver `body` to the frame's content context when `target_origin`
    /// matches its navigated origin exactly. Mismatches (including `*`) are
    /// dropped and recorded.
    pub fn post_message(&self, body: serde_json::Value, target_origin: &str) -> bool {
        let current = locked(&self.origin).clone();
        let delivered = match &current {
            Some(origin) => origin == target_origin,
            None => false,
        };
        if delivered {
            let _ = self.delivered.send(body.clone());
        } else {
            warn!(
                target_origin,
                frame_origin = current.as_deref().unwrap_or("<detached>"),
                "dropping frame message for mismatched origin"
            );
        }
        locked(&self.sent).push(SentFrame {
            body,
            target_origin: target_origin.to_string(),
            delivered,
        });
        delivered
    }

    /// Observe messages that actually reached the content context.
    pub fn subscribe_delivered(&self) -> broadcast::Receiver<serde_json::Value> {
        self.delivered.subscribe()
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        locked(&self.sent).clone()
    }
}
