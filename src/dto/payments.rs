use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::PaymentStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    pub booking_id: Uuid,
}

/// What the client needs to drive the provider's checkout flow.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntentData {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub provider_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
}
