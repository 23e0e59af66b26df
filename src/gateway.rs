use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// What the external provider hands back when an intent is created.
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: Option<String>,
}

/// The payment provider as seen by this service: create an intent, refund an
/// intent. Webhook events arrive separately over HTTP.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        booking_id: Uuid,
    ) -> Result<CreatedIntent, AppError>;

    /// Refund the full charge behind an intent. Returns the provider refund id.
    async fn refund(&self, provider_intent_id: &str) -> Result<String, AppError>;
}

/// HTTP client for a Stripe-shaped provider API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        booking_id: Uuid,
    ) -> Result<CreatedIntent, AppError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let params = [
            ("amount", amount.to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[booking_id]", booking_id.to_string()),
        ];

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::PaymentGateway(format!(
                "create_intent returned {status}: {body}"
            )));
        }

        let intent: IntentResponse = resp
            .json()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        Ok(CreatedIntent {
            intent_id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn refund(&self, provider_intent_id: &str) -> Result<String, AppError> {
        let url = format!("{}/v1/refunds", self.base_url);
        let params = [("payment_intent", provider_intent_id.to_string())];

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::PaymentGateway(format!(
                "refund returned {status}: {body}"
            )));
        }

        let refund: RefundResponse = resp
            .json()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        Ok(refund.id)
    }
}
