//! HTTP client for a Stripe-compatible payment API.

use async_trait::async_trait;
use domain::PaymentId;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{
    GatewayConfig, GatewayError, IntentRequest, PaymentGateway, PaymentIntent, Result,
    WebhookEvent, WebhookVerifier,
};

#[derive(Deserialize)]
struct IntentBody {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct MethodBody {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Payment gateway backed by the processor's REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    verifier: WebhookVerifier,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::from_transport)?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            verifier: WebhookVerifier::new(
                config.webhook_secret.clone(),
                config.signature_tolerance,
            ),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(&self.api_key)
            .form(form)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

            tracing::warn!(path, status = status.as_u16(), %message, "Gateway call failed");
            return Err(if status == reqwest::StatusCode::PAYMENT_REQUIRED {
                GatewayError::Declined(message)
            } else {
                GatewayError::Api {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        response.json::<T>().await.map_err(GatewayError::from_transport)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, request), fields(amount = request.amount.cents(), currency = %request.currency))]
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
        let form = [
            ("amount", request.amount.cents().to_string()),
            ("currency", request.currency.to_string()),
            ("description", request.description.clone()),
            ("metadata[customer_id]", request.customer_id.to_string()),
        ];
        let body: IntentBody = self.post_form("/v1/payment_intents", &form).await?;

        Ok(PaymentIntent {
            id: PaymentId::new(body.id),
            client_secret: body.client_secret.unwrap_or_default(),
            status: body.status,
        })
    }

    #[tracing::instrument(skip(self, token))]
    async fn create_payment_method_from_token(&self, token: &str) -> Result<String> {
        let form = [
            ("type", "card".to_string()),
            ("card[token]", token.to_string()),
        ];
        let body: MethodBody = self.post_form("/v1/payment_methods", &form).await?;
        Ok(body.id)
    }

    #[tracing::instrument(skip(self), fields(intent_id = %intent_id))]
    async fn attach_payment_method(&self, method_id: &str, intent_id: &PaymentId) -> Result<()> {
        let form = [("payment_method", method_id.to_string())];
        let _: IntentBody = self
            .post_form(&format!("/v1/payment_intents/{intent_id}"), &form)
            .await?;
        Ok(())
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.verifier.verify(payload, signature)
    }
}
