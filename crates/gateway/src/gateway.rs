use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Currency, CustomerId, Money, PaymentId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Parameters for a new payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount: Money,
    pub currency: Currency,
    pub description: String,
    pub customer_id: CustomerId,
}

/// The gateway's view of a freshly created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentId,
    /// Handed to the client to complete authorization.
    pub client_secret: String,
    /// Gateway status string, e.g. `requires_payment_method`.
    pub status: String,
}

/// A webhook delivery whose signature has been verified.
///
/// Only the envelope is typed; `object` is the event's opaque `data.object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub created: Option<DateTime<Utc>>,
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Reads a string field of the event object.
    pub fn object_str(&self, field: &str) -> Option<&str> {
        self.object
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Capabilities consumed from the external payment processor.
///
/// Every call is synchronous from the caller's point of view and fallible;
/// errors are always [`crate::GatewayError`], never local persistence errors.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<PaymentIntent>;

    /// Exchanges a client-side card token for a reusable payment method id.
    async fn create_payment_method_from_token(&self, token: &str) -> Result<String>;

    async fn attach_payment_method(&self, method_id: &str, intent_id: &PaymentId) -> Result<()>;

    /// Checks the signature header against the raw body and parses the event.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent>;
}
