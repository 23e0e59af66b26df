use serde::Deserialize;
use std::collections::HashMap;

/// Provider event envelope, Stripe-shaped. Only the fields the reconciler
/// reads are modeled; everything else is ignored by serde.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

/// The inner object: a payment intent for `payment_intent.*` events, a charge
/// for `charge.*` events. A charge carries its intent in `payment_intent`,
/// which is the single correlation key used for lookups.
#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WebhookObject {
    /// Intent reference regardless of object flavor: the object id for
    /// intent events, the `payment_intent` field for charge events.
    pub fn intent_ref(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }
}
