use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde_json::json;
use url::Url;

use super::*;
use crate::registry::ElementFactory;

struct ProbeElement {
    tag: String,
    marker: &'static str,
    disconnected: AtomicBool,
}

impl ProbeElement {
    fn factory(tag: &'static str, marker: &'static str) -> ElementFactory {
        Arc::new(move |_window| {
            Arc::new(ProbeElement {
                tag: tag.to_string(),
                marker,
                disconnected: AtomicBool::new(false),
            }) as Arc<dyn HostElement>
        })
    }
}

impl HostElement for ProbeElement {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn second_registration_keeps_first_definition() {
    let window = HostWindow::new();
    assert!(window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "first")));
    assert!(!window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "second")));

    let element = window
        .create_element("probe-el")
        .downcast::<ProbeElement>()
        .expect("upgraded element");
    assert_eq!(element.marker, "first");
}

#[tokio::test]
async fn when_defined_resolves_immediately_for_defined_tag() {
    let window = HostWindow::new();
    window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "only"));
    tokio::time::timeout(Duration::from_secs(1), window.when_defined("probe-el"))
        .await
        .expect("readiness should be immediate");
}

#[tokio::test]
async fn when_defined_resolves_after_late_definition() {
    let window = HostWindow::new();
    let waiter = {
        let window = Arc::clone(&window);
        tokio::spawn(async move { window.when_defined("probe-el").await })
    };
    window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "late"));
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("definition should resolve the waiter")
        .expect("waiter task");
}

#[tokio::test]
async fn placeholder_upgrades_in_place_when_definition_lands() {
    let window = HostWindow::new();
    let placeholder = window.create_element("probe-el");
    assert!(!placeholder.is_upgraded());
    assert!(placeholder.downcast::<ProbeElement>().is_none());
    window.document().append(&placeholder);

    window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "upgraded"));

    let live = window
        .document()
        .query_selector("probe-el")
        .expect("node present");
    assert!(live.is_upgraded());
    assert_eq!(
        live.downcast::<ProbeElement>().expect("probe").marker,
        "upgraded"
    );
    // The pre-upgrade handle is a snapshot and stays a placeholder; callers
    // re-query for the live element.
    assert!(!placeholder.is_upgraded());
}

#[tokio::test]
async fn remove_runs_element_teardown() {
    let window = HostWindow::new();
    window.register_if_absent("probe-el", ProbeElement::factory("probe-el", "torn"));
    let handle = window.create_element("probe-el");
    window.document().append(&handle);
    let element = handle.downcast::<ProbeElement>().expect("probe");

    window.document().remove("probe-el");
    assert!(element.disconnected.load(Ordering::SeqCst));
    assert!(window.document().query_selector("probe-el").is_none());
}

#[test]
fn frame_delivers_only_to_exact_origin() {
    let frame = EmbeddedFrame::new();
    frame.navigate(&Url::parse("https://pay.example/c?session=9").unwrap());

    assert!(frame.post_message(json!({"n": 1}), "https://pay.example"));
    assert!(!frame.post_message(json!({"n": 2}), "https://evil.example"));
    assert!(!frame.post_message(json!({"n": 3}), "*"));

    let sent = frame.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].delivered);
    assert!(!sent[1].delivered);
    assert!(!sent[2].delivered);
    assert_eq!(sent[0].target_origin, "https://pay.example");
}

#[test]
fn detached_frame_is_unreachable() {
    let frame = EmbeddedFrame::new();
    assert!(!frame.is_reachable());
    assert!(!frame.post_message(json!({}), "https://pay.example"));
}

#[test]
fn attributes_reflect_set_and_remove() {
    let attributes = ElementAttributes::new();
    attributes.set("open", "");
    assert!(attributes.has("open"));
    assert_eq!(attributes.get("open").as_deref(), Some(""));
    attributes.remove("open");
    assert!(!attributes.has("open"));
}
