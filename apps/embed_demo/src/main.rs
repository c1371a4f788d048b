use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

use host_dom::{BrowserEnvironment, HostWindow};
use shared::{
    domain::Product,
    protocol::{CheckoutPayload, CompletionEnvelope, ProtocolMessage},
};
use widget_core::{register_modal, CheckoutController, CheckoutModal, CLOSE_DELAY, MODAL_TAG};

/// Simulated host page driving one checkout round trip against a fake
/// remote checkout surface.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "https://pay.example/session/demo?locale=en")]
    checkout_url: String,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long, default_value_t = 49.99)]
    amount: f64,
    /// Report a declined checkout instead of a completed one.
    #[arg(long)]
    fail: bool,
    /// Dismiss the checkout instead of finishing it.
    #[arg(long)]
    dismiss: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    url::Url::parse(&args.checkout_url)
        .with_context(|| format!("--checkout-url '{}' is not absolute", args.checkout_url))?;

    let window = HostWindow::new();
    register_modal(&window);
    let controller = CheckoutController::new(&BrowserEnvironment::new(Arc::clone(&window)))?;

    controller.on_success(|data| println!("checkoutSuccess: {}", json!(data)));
    controller.on_failure(|data| println!("checkoutFailure: {}", json!(data)));
    controller.on_close(|| println!("checkoutClose"));

    let modal = window
        .document()
        .query_selector(MODAL_TAG)
        .and_then(|handle| handle.downcast::<CheckoutModal>())
        .context("checkout modal element missing")?;

    let remote = spawn_remote_surface(&modal, Arc::clone(&window), args.fail, args.dismiss);

    let payload = CheckoutPayload {
        id: Uuid::new_v4().to_string().into(),
        merchant_id: "merchant_demo".into(),
        platform_order_id: Uuid::new_v4().to_string().into(),
        products: vec![Product {
            id: "sku_1".into(),
            name: "Demo subscription".to_string(),
            quantity: 1,
            unit_price: args.amount,
        }],
        amount: args.amount,
        sales_tax: 0.0,
        redirect_url: "https://shop.example/thanks".to_string(),
        checkout_url: args.checkout_url,
        mode: args.mode,
    };

    controller.initiate_checkout(payload).await;
    remote.await.context("remote surface task")?;
    sleep(CLOSE_DELAY + Duration::from_millis(50)).await;

    let state = modal.state();
    println!(
        "modal open={} url={}",
        state.is_open,
        state
            .current_url
            .map(String::from)
            .unwrap_or_else(|| "<none>".to_string())
    );

    controller.shutdown();
    Ok(())
}

/// Plays the checkout page: waits for the origin-scoped token frame, then
/// posts the outcome back through the window channel.
fn spawn_remote_surface(
    modal: &Arc<CheckoutModal>,
    window: Arc<HostWindow>,
    fail: bool,
    dismiss: bool,
) -> tokio::task::JoinHandle<()> {
    let mut delivered = modal.frame().subscribe_delivered();
    tokio::spawn(async move {
        let Ok(body) = delivered.recv().await else {
            return;
        };
        tracing::info!(
            checkout_url = %body["checkoutToken"]["checkoutUrl"],
            "remote surface received checkout token"
        );
        sleep(Duration::from_millis(250)).await;

        if dismiss {
            window.post_message(ProtocolMessage::CheckoutClosed);
            window.post_message(ProtocolMessage::CloseModal);
            return;
        }
        let message = if fail {
            ProtocolMessage::CheckoutFailed {
                data: Some(CompletionEnvelope {
                    data: Some(json!({ "reason": "card_declined" })),
                }),
            }
        } else {
            ProtocolMessage::CheckoutComplete {
                data: Some(CompletionEnvelope {
                    data: Some(json!({ "orderId": Uuid::new_v4().to_string() })),
                }),
            }
        };
        window.post_message(message);
    })
}
