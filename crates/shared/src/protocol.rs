use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    domain::{CheckoutId, MerchantId, PlatformOrderId, Product},
    error::WidgetError,
};

/// One checkout attempt as handed over by the embedding page.
///
/// The widget treats the payload as immutable apart from a single rewrite of
/// `checkout_url` when `mode` is set. Field names follow the JSON the remote
/// checkout surface expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    pub id: CheckoutId,
    pub merchant_id: MerchantId,
    pub platform_order_id: PlatformOrderId,
    pub products: Vec<Product>,
    pub amount: f64,
    pub sales_tax: f64,
    pub redirect_url: String,
    pub checkout_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl CheckoutPayload {
    /// The checkout URL must be absolute before the modal may be invoked.
    pub fn parsed_checkout_url(&self) -> Result<Url, WidgetError> {
        if self.checkout_url.trim().is_empty() {
            return Err(WidgetError::invalid_payload("checkout url is empty"));
        }
        Url::parse(&self.checkout_url).map_err(|err| {
            WidgetError::invalid_payload(format!(
                "checkout url '{}' is not an absolute url: {err}",
                self.checkout_url
            ))
        })
    }

    /// Origin the payload may be delivered to, serialized for message posting.
    pub fn checkout_origin(&self) -> Result<String, WidgetError> {
        let url = self.parsed_checkout_url()?;
        Ok(url.origin().ascii_serialization())
    }
}

/// Inner `data` envelope carried by completion/failure messages. The remote
/// surface nests the interesting value one level down; both levels may be
/// absent and consumers must tolerate that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CompletionEnvelope {
    pub fn into_inner(self) -> Option<serde_json::Value> {
        self.data
    }
}

/// Cross-context message envelope, tagged by `action`. There is no schema
/// versioning; anything unrecognized decodes to `Unknown` and is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProtocolMessage {
    CheckoutComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<CompletionEnvelope>,
    },
    CheckoutFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<CompletionEnvelope>,
    },
    CheckoutClosed,
    CloseModal,
    #[serde(other)]
    Unknown,
}

impl ProtocolMessage {
    /// Decode a raw wire body. Missing or unrecognizable `action` fields map
    /// to `Unknown` rather than an error.
    pub fn from_json_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Unknown)
    }
}

/// Outbound host-to-frame message delivering the payload once the frame is
/// reachable. Scoped to the checkout URL's origin, never a wildcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutTokenFrame {
    pub checkout_token: CheckoutPayload,
}
