use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::watch;
use tracing::debug;

use crate::{document::HostElement, HostWindow};

pub type ElementFactory = Arc<dyn Fn(Arc<HostWindow>) -> Arc<dyn HostElement> + Send + Sync>;

/// Per-window element definitions with init-once semantics. The first
/// definition for a tag wins; later attempts are ignored. Readiness is
/// observable as a one-shot future per tag.
pub struct ElementRegistry {
    definitions: Mutex<HashMap<String, ElementFactory>>,
    readiness: Mutex<HashMap<String, watch::Sender<bool>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ElementRegistry {
    pub(crate) fn new() -> Self {
        Self {
            definitions: Mutex::new(HashMap::new()),
            readiness: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        locked(&self.definitions).contains_key(tag)
    }

    pub(crate) fn install(&self, tag: &str, factory: ElementFactory) -> bool {
        let mut definitions = locked(&self.definitions);
        if definitions.contains_key(tag) {
            debug!(tag, "element tag already defined, keeping first definition");
            return false;
        }
        definitions.insert(tag.to_string(), factory);
        true
    }

    pub(crate) fn factory(&self, tag: &str) -> Option<ElementFactory> {
        locked(&self.definitions).get(tag).cloned()
    }

    pub(crate) fn mark_defined(&self, tag: &str) {
        self.readiness_sender(tag).send_replace(true);
    }

    /// Resolves once `tag` is defined. Immediate when the definition already
    /// landed; never, when it never does.
    pub async fn when_defined(&self, tag: &str) {
        let mut rx = self.readiness_sender(tag).subscribe();
        // wait_for only errs when the registry itself is gone; treat that as
        // abandonment and return.
        let _ = rx.wait_for(|defined| *defined).await;
    }

    fn readiness_sender(&self, tag: &str) -> watch::Sender<bool> {
        let defined = self.is_defined(tag);
        locked(&self.readiness)
            .entry(tag.to_string())
            .or_insert_with(|| watch::channel(defined).0)
            .clone()
    }
}
