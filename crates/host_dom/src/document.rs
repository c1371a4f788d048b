use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{registry::ElementFactory, HostWindow};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An element living in the document. Concrete element types are recovered by
/// downcast; an element that does not downcast to the expected type simply
/// does not offer that contract.
pub trait HostElement: Send + Sync + 'static {
    fn tag(&self) -> &str;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    /// Teardown hook, invoked when the element is removed from the document.
    fn disconnect(&self) {}
}

/// Snapshot handle to a document node. Handles do not track later upgrades;
/// callers that need the live element re-query the document.
#[derive(Clone)]
pub enum ElementHandle {
    Upgraded(Arc<dyn HostElement>),
    Placeholder { tag: String },
}

impl ElementHandle {
    pub fn tag(&self) -> &str {
        match self {
            Self::Upgraded(element) => element.tag(),
            Self::Placeholder { tag } => tag,
        }
    }

    pub fn is_upgraded(&self) -> bool {
        matches!(self, Self::Upgraded(_))
    }

    /// Recover the concrete element type. `None` for placeholders and for
    /// elements of a different type under the same tag.
    pub fn downcast<T: HostElement>(&self) -> Option<Arc<T>> {
        match self {
            Self::Upgraded(element) => Arc::clone(element).into_any().downcast::<T>().ok(),
            Self::Placeholder { .. } => None,
        }
    }
}

enum NodeState {
    Upgraded(Arc<dyn HostElement>),
    Placeholder,
}

struct DocumentNode {
    tag: String,
    state: NodeState,
}

/// Minimal flat document: tagged nodes, first-match queries, in-place
/// placeholder upgrades when a definition lands.
pub struct Document {
    nodes: Mutex<Vec<DocumentNode>>,
}

impl Document {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, handle: &ElementHandle) {
        let state = match handle {
            ElementHandle::Upgraded(element) => NodeState::Upgraded(Arc::clone(element)),
            ElementHandle::Placeholder { .. } => NodeState::Placeholder,
        };
        locked(&self.nodes).push(DocumentNode {
            tag: handle.tag().to_string(),
            state,
        });
    }

    pub fn query_selector(&self, tag: &str) -> Option<ElementHandle> {
        locked(&self.nodes).iter().find_map(|node| {
            if node.tag != tag {
                return None;
            }
            Some(match &node.state {
                NodeState::Upgraded(element) => ElementHandle::Upgraded(Arc::clone(element)),
                NodeState::Placeholder => ElementHandle::Placeholder {
                    tag: node.tag.clone(),
                },
            })
        })
    }

    /// Remove every node under `tag`, running element teardown hooks.
    pub fn remove(&self, tag: &str) {
        let removed: Vec<DocumentNode> = {
            let mut nodes = locked(&self.nodes);
            let mut kept = Vec::with_capacity(nodes.len());
            let mut dropped = Vec::new();
            for node in nodes.drain(..) {
                if node.tag == tag {
                    dropped.push(node);
                } else {
                    kept.push(node);
                }
            }
            *nodes = kept;
            dropped
        };
        for node in removed {
            if let NodeState::Upgraded(element) = node.state {
                element.disconnect();
            }
        }
    }

    pub(crate) fn upgrade_matching(
        &self,
        tag: &str,
        window: &Arc<HostWindow>,
        factory: &ElementFactory,
    ) {
        let mut nodes = locked(&self.nodes);
        for node in nodes.iter_mut() {
            if node.tag == tag && matches!(node.state, NodeState::Placeholder) {
                node.state = NodeState::Upgraded(factory(Arc::clone(window)));
            }
        }
    }
}

/// Attribute map shared by concrete elements for styling hooks.
#[derive(Default)]
pub struct ElementAttributes {
    inner: Mutex<HashMap<String, String>>,
}

impl ElementAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        locked(&self.inner).insert(name.to_string(), value.to_string());
    }

    pub fn remove(&self, name: &str) {
        locked(&self.inner).remove(name);
    }

    pub fn has(&self, name: &str) -> bool {
        locked(&self.inner).contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        locked(&self.inner).get(name).cloned()
    }
}
