//! Embeddable checkout widget: a singleton modal overlay hosting a remote
//! checkout frame, plus the controller that bridges completion messages from
//! that frame back to host-page callbacks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use serde_json::Value;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, error, info, warn};
use url::Url;

use host_dom::{ElementHandle, HostEnvironment, HostEvent, HostWindow};
use shared::{
    error::WidgetError,
    protocol::{CheckoutPayload, CompletionEnvelope, ProtocolMessage},
};

pub mod callbacks;
pub mod modal;

pub use callbacks::CallbackTable;
pub use modal::{CheckoutModal, ModalState, VisualSignal, CLOSE_DELAY, MODAL_TAG};

const MODE_PARAM: &str = "mode";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the checkout modal definition on `window` unless the tag is
/// already claimed. Safe to call more than once; the first definition stays
/// active. Returns whether this call installed it.
pub fn register_modal(window: &Arc<HostWindow>) -> bool {
    window.register_if_absent(
        MODAL_TAG,
        Arc::new(|window| -> Arc<dyn host_dom::HostElement> { CheckoutModal::create(window) }),
    )
}

/// Host-page entry point. Owns callback registration, a reference to the
/// modal element, and the long-lived listener on the window message channel.
///
/// One controller per page is assumed; a second instance would independently
/// react to every protocol message. [`CheckoutController::shutdown`] stops
/// the listener for embedders that tear their page down.
pub struct CheckoutController {
    window: Arc<HostWindow>,
    callbacks: CallbackTable,
    held_modal: Mutex<ElementHandle>,
    completed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CheckoutController {
    /// Construct against a host environment. Fails synchronously when no
    /// window is available; nothing here works without one. Construction
    /// finds or creates the modal element immediately and refreshes the held
    /// reference in the background once the element definition completes,
    /// without ever blocking on that.
    pub fn new(env: &dyn HostEnvironment) -> Result<Arc<Self>, WidgetError> {
        let window = env.window().ok_or_else(|| {
            WidgetError::environment_mismatch(
                "no host window; the checkout widget requires a browser-like context",
            )
        })?;

        let held_modal = match window.document().query_selector(MODAL_TAG) {
            Some(handle) => {
                debug!("checkout modal element already in document");
                handle
            }
            None => {
                debug!("checkout modal element missing, creating one");
                let handle = window.create_element(MODAL_TAG);
                window.document().append(&handle);
                handle
            }
        };

        let controller = Arc::new(Self {
            window: Arc::clone(&window),
            callbacks: CallbackTable::default(),
            held_modal: Mutex::new(held_modal),
            completed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });
        let refresh = Self::spawn_reference_refresh(&controller);
        let listener = Self::spawn_message_listener(&controller);
        locked(&controller.tasks).extend([refresh, listener]);
        Ok(controller)
    }

    pub fn on_success(&self, handler: impl Fn(Option<Value>) + Send + Sync + 'static) {
        self.callbacks.set_success(Arc::new(handler));
    }

    pub fn on_failure(&self, handler: impl Fn(Option<Value>) + Send + Sync + 'static) {
        self.callbacks.set_failure(Arc::new(handler));
    }

    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.callbacks.set_close(Arc::new(handler));
    }

    /// Start a checkout. Resolves once the open attempt has been issued or
    /// logged as failed; resolution does not imply the modal opened. Usage
    /// errors (missing or malformed checkout URL, unusable modal element)
    /// are logged and swallowed so an embedding page never sees a panic or
    /// error from this path. If the modal tag is never defined the call
    /// suspends indefinitely and is effectively abandoned.
    pub async fn initiate_checkout(&self, payload: CheckoutPayload) {
        if let Err(err) = self.try_initiate_checkout(payload).await {
            error!(error = %err, "checkout not started");
        }
    }

    async fn try_initiate_checkout(&self, mut payload: CheckoutPayload) -> Result<(), WidgetError> {
        payload.parsed_checkout_url()?;
        if let Some(mode) = payload.mode.clone() {
            payload.checkout_url = set_mode_param(&payload.checkout_url, &mode)?;
        }

        self.completed.store(false, Ordering::SeqCst);
        info!(url = %payload.checkout_url, "initiating checkout");
        self.window.when_defined(MODAL_TAG).await;

        // Resolve fresh from the document; the held reference may predate the
        // definition or have been replaced since.
        let handle = self
            .window
            .document()
            .query_selector(MODAL_TAG)
            .ok_or_else(|| {
                WidgetError::modal_not_initialized("modal element missing from document")
            })?;
        let modal = handle.downcast::<CheckoutModal>().ok_or_else(|| {
            WidgetError::modal_not_initialized(
                "element under the modal tag does not expose the open contract",
            )
        })?;
        modal.create_modal(payload);
        Ok(())
    }

    /// Abort the background listener and refresh tasks. After this the
    /// controller no longer reacts to protocol messages.
    pub fn shutdown(&self) {
        for task in locked(&self.tasks).drain(..) {
            task.abort();
        }
    }

    fn handle_protocol_message(&self, message: ProtocolMessage) {
        match message {
            ProtocolMessage::CheckoutComplete { data } => {
                info!("checkout completed");
                self.completed.store(true, Ordering::SeqCst);
                self.request_modal_close();
                self.callbacks
                    .invoke_success(data.and_then(CompletionEnvelope::into_inner));
            }
            ProtocolMessage::CheckoutFailed { data } => {
                info!("checkout failed");
                self.completed.store(true, Ordering::SeqCst);
                self.request_modal_close();
                self.callbacks
                    .invoke_failure(data.and_then(CompletionEnvelope::into_inner));
            }
            ProtocolMessage::CheckoutClosed => {
                if self.completed.load(Ordering::SeqCst) {
                    debug!("close notification after completion, not a dismissal");
                } else {
                    info!("checkout dismissed");
                    self.callbacks.invoke_close();
                }
            }
            ProtocolMessage::CloseModal | ProtocolMessage::Unknown => {}
        }
    }

    /// Best-effort close through the held reference. An element that does
    /// not offer the close contract is tolerated; the modal's own listener
    /// observes the same messages.
    fn request_modal_close(&self) {
        let handle = locked(&self.held_modal).clone();
        match handle.downcast::<CheckoutModal>() {
            Some(modal) => modal.close_modal(),
            None => debug!("held modal reference offers no close contract"),
        }
    }

    fn spawn_reference_refresh(controller: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(controller);
        let window = Arc::clone(&controller.window);
        tokio::spawn(async move {
            window.when_defined(MODAL_TAG).await;
            let Some(controller) = weak.upgrade() else {
                return;
            };
            if let Some(handle) = controller.window.document().query_selector(MODAL_TAG) {
                *locked(&controller.held_modal) = handle;
                debug!("modal definition complete, held reference refreshed");
            }
        })
    }

    fn spawn_message_listener(controller: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(controller);
        let mut events = controller.window.subscribe();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "controller listener lagged behind window events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(controller) = weak.upgrade() else { break };
                if let HostEvent::Message(message) = event {
                    controller.handle_protocol_message(message);
                }
            }
        })
    }
}

/// Rewrite `checkout_url`'s query string so `mode` is set to `mode_value`
/// exactly once, preserving every other parameter.
fn set_mode_param(checkout_url: &str, mode_value: &str) -> Result<String, WidgetError> {
    let mut url = Url::parse(checkout_url).map_err(|err| {
        WidgetError::invalid_payload(format!("checkout url '{checkout_url}' is invalid: {err}"))
    })?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != MODE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(MODE_PARAM, mode_value);
    }
    Ok(String::from(url))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
