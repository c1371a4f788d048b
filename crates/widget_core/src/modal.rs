use std::{
    any::Any,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use url::Url;

use host_dom::{ElementAttributes, EmbeddedFrame, HostElement, HostEvent, HostWindow, Key};
use shared::protocol::{CheckoutPayload, CheckoutTokenFrame, ProtocolMessage};

/// Reserved tag for the checkout overlay element.
pub const MODAL_TAG: &str = "embedpay-modal";

/// How long the fade-out transition runs before the closed state commits.
pub const CLOSE_DELAY: Duration = Duration::from_millis(300);

const OPEN_ATTRIBUTE: &str = "open";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cosmetic transition signal, decoupled from the authoritative open flag so
/// observers can follow the fade without touching modal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualSignal {
    Hidden,
    FadeIn,
    FadeOut,
}

#[derive(Debug, Clone, Default)]
pub struct ModalState {
    pub is_open: bool,
    pub current_url: Option<Url>,
    pub current_payload: Option<CheckoutPayload>,
    pub opened_at: Option<DateTime<Utc>>,
}

struct ModalTasks {
    listener: Option<JoinHandle<()>>,
    pending_frame: Option<JoinHandle<()>>,
    pending_close: Option<JoinHandle<()>>,
}

/// The checkout overlay. One instance per window, installed under
/// [`MODAL_TAG`]; it hosts the embedded checkout frame and owns its own
/// open/closed lifecycle. Remote messages, the close-modal request, and the
/// Escape key all converge on the same idempotent close path.
pub struct CheckoutModal {
    weak_self: Weak<CheckoutModal>,
    window: Arc<HostWindow>,
    attributes: ElementAttributes,
    frame: EmbeddedFrame,
    state: Mutex<ModalState>,
    visual: watch::Sender<VisualSignal>,
    tasks: Mutex<ModalTasks>,
}

impl CheckoutModal {
    pub fn create(window: Arc<HostWindow>) -> Arc<Self> {
        let (visual, _) = watch::channel(VisualSignal::Hidden);
        let modal = Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            window,
            attributes: ElementAttributes::new(),
            frame: EmbeddedFrame::new(),
            state: Mutex::new(ModalState::default()),
            visual,
            tasks: Mutex::new(ModalTasks {
                listener: None,
                pending_frame: None,
                pending_close: None,
            }),
        });
        locked(&modal.tasks).listener = Some(Self::spawn_listener(&modal));
        modal
    }

    /// Open the overlay for `payload`. An empty or malformed checkout URL is
    /// logged and leaves the modal untouched. Re-opening while a close is
    /// still fading out cancels the pending close commit.
    pub fn create_modal(&self, payload: CheckoutPayload) {
        let url = match payload.parsed_checkout_url() {
            Ok(url) => url,
            Err(err) => {
                error!(error = %err, "refusing to open checkout modal");
                return;
            }
        };

        {
            let mut tasks = locked(&self.tasks);
            if let Some(pending) = tasks.pending_close.take() {
                debug!("cancelling pending close before re-open");
                pending.abort();
            }
            if let Some(pending) = tasks.pending_frame.take() {
                pending.abort();
            }
        }

        {
            let mut state = locked(&self.state);
            state.is_open = true;
            state.current_url = Some(url.clone());
            state.current_payload = Some(payload.clone());
            state.opened_at = Some(Utc::now());
        }
        self.attributes.set(OPEN_ATTRIBUTE, "");
        self.frame.navigate(&url);
        info!(url = %url, "opening checkout modal");

        let origin = url.origin().ascii_serialization();
        let Some(modal) = self.weak_self.upgrade() else {
            return;
        };
        locked(&self.tasks).pending_frame = Some(tokio::spawn(async move {
            modal.window.next_frame().await;
            let _ = modal.visual.send(VisualSignal::FadeIn);
            modal.deliver_payload(payload, &origin);
            locked(&modal.tasks).pending_frame = None;
        }));
    }

    /// Begin closing. The fade-out signal fires immediately; the
    /// authoritative state flips after [`CLOSE_DELAY`] so the transition is
    /// not visually truncated. Idempotent: calls while closed or while a
    /// close is already pending are no-ops.
    pub fn close_modal(&self) {
        if !locked(&self.state).is_open {
            debug!("close requested while already closed");
            return;
        }
        let mut tasks = locked(&self.tasks);
        if tasks.pending_close.is_some() {
            debug!("close already in progress");
            return;
        }
        info!("closing checkout modal");
        let _ = self.visual.send(VisualSignal::FadeOut);
        let Some(modal) = self.weak_self.upgrade() else {
            return;
        };
        tasks.pending_close = Some(tokio::spawn(async move {
            tokio::time::sleep(CLOSE_DELAY).await;
            modal.commit_close();
        }));
    }

    pub fn is_open(&self) -> bool {
        locked(&self.state).is_open
    }

    pub fn state(&self) -> ModalState {
        locked(&self.state).clone()
    }

    /// Reflected `open` attribute, the styling hook for the host page.
    pub fn has_open_attribute(&self) -> bool {
        self.attributes.has(OPEN_ATTRIBUTE)
    }

    pub fn visual_signals(&self) -> watch::Receiver<VisualSignal> {
        self.visual.subscribe()
    }

    pub fn frame(&self) -> &EmbeddedFrame {
        &self.frame
    }

    fn deliver_payload(&self, payload: CheckoutPayload, origin: &str) {
        if !self.frame.is_reachable() {
            debug!("frame content context unreachable, skipping payload delivery");
            return;
        }
        match serde_json::to_value(CheckoutTokenFrame {
            checkout_token: payload,
        }) {
            Ok(body) => {
                self.frame.post_message(body, origin);
            }
            Err(err) => warn!(error = %err, "failed to encode checkout token frame"),
        }
    }

    fn commit_close(&self) {
        {
            let mut state = locked(&self.state);
            state.is_open = false;
            state.current_payload = None;
        }
        self.attributes.remove(OPEN_ATTRIBUTE);
        let _ = self.visual.send(VisualSignal::Hidden);
        locked(&self.tasks).pending_close = None;
        debug!("checkout modal closed");
    }

    fn spawn_listener(modal: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(modal);
        let mut events = modal.window.subscribe();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "modal listener lagged behind window events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(modal) = weak.upgrade() else { break };
                match event {
                    HostEvent::Message(ProtocolMessage::CheckoutComplete { .. })
                    | HostEvent::Message(ProtocolMessage::CloseModal) => modal.close_modal(),
                    HostEvent::KeyDown(Key::Escape) if modal.is_open() => modal.close_modal(),
                    _ => {}
                }
            }
        })
    }
}

impl HostElement for CheckoutModal {
    fn tag(&self) -> &str {
        MODAL_TAG
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn disconnect(&self) {
        let mut tasks = locked(&self.tasks);
        for task in [
            tasks.listener.take(),
            tasks.pending_frame.take(),
            tasks.pending_close.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        debug!("checkout modal disconnected");
    }
}

#[cfg(test)]
#[path = "tests/modal_tests.rs"]
mod tests;
