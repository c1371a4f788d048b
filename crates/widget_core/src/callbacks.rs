use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

pub type CompletionHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Optional-handler table with one slot per checkout event. The last
/// registration wins; an empty slot means the event is silently skipped,
/// which is distinct from a registered handler that happens to do nothing.
#[derive(Default)]
pub struct CallbackTable {
    success: Mutex<Option<CompletionHandler>>,
    failure: Mutex<Option<CompletionHandler>>,
    close: Mutex<Option<CloseHandler>>,
}

impl CallbackTable {
    pub fn set_success(&self, handler: CompletionHandler) {
        *locked(&self.success) = Some(handler);
    }

    pub fn set_failure(&self, handler: CompletionHandler) {
        *locked(&self.failure) = Some(handler);
    }

    pub fn set_close(&self, handler: CloseHandler) {
        *locked(&self.close) = Some(handler);
    }

    // Handlers are cloned out of the slot before invocation so a callback may
    // re-register without deadlocking.

    pub fn invoke_success(&self, data: Option<Value>) {
        let handler = locked(&self.success).clone();
        match handler {
            Some(handler) => handler(data),
            None => debug!("no checkout success handler registered"),
        }
    }

    pub fn invoke_failure(&self, data: Option<Value>) {
        let handler = locked(&self.failure).clone();
        match handler {
            Some(handler) => handler(data),
            None => debug!("no checkout failure handler registered"),
        }
    }

    pub fn invoke_close(&self) {
        let handler = locked(&self.close).clone();
        match handler {
            Some(handler) => handler(),
            None => debug!("no checkout close handler registered"),
        }
    }
}
