use std::{sync::Arc, time::Duration};

use serde_json::json;

use super::*;
use host_dom::{HostWindow, Key};
use shared::protocol::{CheckoutPayload, ProtocolMessage};

fn payload(checkout_url: &str) -> CheckoutPayload {
    CheckoutPayload {
        id: "chk_modal".into(),
        merchant_id: "m_1".into(),
        platform_order_id: "ord_1".into(),
        products: Vec::new(),
        amount: 25.0,
        sales_tax: 2.5,
        redirect_url: "https://shop.example/done".to_string(),
        checkout_url: checkout_url.to_string(),
        mode: None,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn empty_checkout_url_leaves_modal_untouched() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);

    modal.create_modal(payload(""));

    assert!(!modal.is_open());
    assert!(!modal.has_open_attribute());
    let state = modal.state();
    assert!(state.current_url.is_none());
    assert!(state.current_payload.is_none());
}

#[tokio::test(start_paused = true)]
async fn relative_checkout_url_leaves_modal_untouched() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);

    modal.create_modal(payload("/checkout/123"));

    assert!(!modal.is_open());
    assert!(modal.state().current_payload.is_none());
}

#[tokio::test(start_paused = true)]
async fn open_sets_state_attribute_and_posts_payload_to_exact_origin() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);
    let mut visual = modal.visual_signals();

    modal.create_modal(payload("https://pay.example/c?session=5"));
    assert!(modal.is_open());
    assert!(modal.has_open_attribute());
    assert_eq!(
        modal.state().current_url.map(String::from).as_deref(),
        Some("https://pay.example/c?session=5")
    );

    // Visibility and payload delivery land on the next frame tick.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*visual.borrow_and_update(), VisualSignal::FadeIn);

    let sent = modal.frame().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target_origin, "https://pay.example");
    assert!(sent[0].delivered);
    assert_eq!(
        sent[0].body["checkoutToken"]["checkoutUrl"],
        json!("https://pay.example/c?session=5")
    );
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_commits_after_the_delay() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);
    modal.create_modal(payload("https://pay.example/c"));
    settle().await;

    modal.close_modal();
    modal.close_modal();
    modal.close_modal();

    // The authoritative flip waits out the fade; the open flag holds until
    // the delay elapses.
    tokio::time::sleep(CLOSE_DELAY - Duration::from_millis(50)).await;
    assert!(modal.is_open());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!modal.is_open());
    assert!(!modal.has_open_attribute());

    // A further close after the commit changes nothing.
    let mut visual = modal.visual_signals();
    visual.borrow_and_update();
    modal.close_modal();
    settle().await;
    assert!(!visual.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn close_from_closed_state_is_a_noop() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);
    let mut visual = modal.visual_signals();
    visual.borrow_and_update();

    modal.close_modal();
    settle().await;

    assert!(!modal.is_open());
    assert!(!visual.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn escape_key_closes_an_open_modal() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(Arc::clone(&window));
    modal.create_modal(payload("https://pay.example/c"));
    settle().await;

    window.dispatch_key(Key::Escape);
    settle().await;
    tokio::time::sleep(CLOSE_DELAY + Duration::from_millis(10)).await;

    assert!(!modal.is_open());
}

#[tokio::test(start_paused = true)]
async fn escape_key_is_ignored_while_closed() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(Arc::clone(&window));
    let mut visual = modal.visual_signals();
    visual.borrow_and_update();

    window.dispatch_key(Key::Escape);
    settle().await;

    assert!(!modal.is_open());
    assert!(!visual.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn close_modal_message_closes_the_overlay() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(Arc::clone(&window));
    modal.create_modal(payload("https://pay.example/c"));
    settle().await;

    window.post_message(ProtocolMessage::CloseModal);
    settle().await;
    tokio::time::sleep(CLOSE_DELAY + Duration::from_millis(10)).await;

    assert!(!modal.is_open());
}

#[tokio::test(start_paused = true)]
async fn completion_message_closes_the_overlay() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(Arc::clone(&window));
    modal.create_modal(payload("https://pay.example/c"));
    settle().await;

    window.post_message(ProtocolMessage::CheckoutComplete { data: None });
    settle().await;
    tokio::time::sleep(CLOSE_DELAY + Duration::from_millis(10)).await;

    assert!(!modal.is_open());
}

#[tokio::test(start_paused = true)]
async fn reopening_during_the_fade_cancels_the_pending_commit() {
    let window = HostWindow::new();
    let modal = CheckoutModal::create(window);
    modal.create_modal(payload("https://pay.example/c?first=1"));
    settle().await;

    modal.close_modal();
    tokio::time::sleep(Duration::from_millis(100)).await;
    modal.create_modal(payload("https://pay.example/c?second=1"));

    tokio::time::sleep(CLOSE_DELAY * 2).await;
    assert!(modal.is_open());
    assert_eq!(
        modal.state().current_url.map(String::from).as_deref(),
        Some("https://pay.example/c?second=1")
    );
}
