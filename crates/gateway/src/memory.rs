//! Scriptable in-memory gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::PaymentId;

use crate::{
    GatewayError, IntentRequest, PaymentGateway, PaymentIntent, Result, WebhookEvent,
    WebhookVerifier,
};

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<PaymentId, IntentRequest>,
    methods: HashMap<String, String>,
    attached: HashMap<PaymentId, String>,
    next_intent: u32,
    next_method: u32,
    fail_on_create_intent: bool,
    fail_on_create_method: bool,
    fail_on_attach: bool,
}

/// In-memory payment gateway.
///
/// Hands out sequential intent ids (`pi_0001`, ...) and verifies webhooks with
/// the same HMAC scheme as the real processor.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
    verifier: WebhookVerifier,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new("whsec_local")
    }
}

impl InMemoryGateway {
    /// Creates a gateway whose webhooks are signed with `webhook_secret`.
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            verifier: WebhookVerifier::new(webhook_secret, Duration::from_secs(300)),
        }
    }

    pub fn set_fail_on_create_intent(&self, fail: bool) {
        self.write().fail_on_create_intent = fail;
    }

    pub fn set_fail_on_create_method(&self, fail: bool) {
        self.write().fail_on_create_method = fail;
    }

    pub fn set_fail_on_attach(&self, fail: bool) {
        self.write().fail_on_attach = fail;
    }

    /// Number of intents created so far.
    pub fn intent_count(&self) -> usize {
        self.read().intents.len()
    }

    /// The payment method attached to an intent, if any.
    pub fn attached_method(&self, intent_id: &PaymentId) -> Option<String> {
        self.read().attached.get(intent_id).cloned()
    }

    /// Signs `payload` the way the processor would sign a delivery now.
    pub fn sign_event(&self, payload: &[u8]) -> Result<String> {
        self.verifier.sign(payload, Utc::now().timestamp())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_payment_intent(&self, request: &IntentRequest) -> Result<PaymentIntent> {
        let mut state = self.write();

        if state.fail_on_create_intent {
            return Err(GatewayError::Api {
                status: 500,
                message: "intent creation failed".to_string(),
            });
        }

        state.next_intent += 1;
        let id = PaymentId::new(format!("pi_{:04}", state.next_intent));
        state.intents.insert(id.clone(), request.clone());

        Ok(PaymentIntent {
            client_secret: format!("{id}_secret_test"),
            id,
            status: "requires_payment_method".to_string(),
        })
    }

    async fn create_payment_method_from_token(&self, token: &str) -> Result<String> {
        let mut state = self.write();

        if state.fail_on_create_method {
            return Err(GatewayError::Declined("card token rejected".to_string()));
        }

        state.next_method += 1;
        let method_id = format!("pm_{:04}", state.next_method);
        state.methods.insert(method_id.clone(), token.to_string());
        Ok(method_id)
    }

    async fn attach_payment_method(&self, method_id: &str, intent_id: &PaymentId) -> Result<()> {
        let mut state = self.write();

        if state.fail_on_attach {
            return Err(GatewayError::Declined("payment method declined".to_string()));
        }
        if !state.intents.contains_key(intent_id) {
            return Err(GatewayError::Api {
                status: 404,
                message: format!("No such payment_intent: {intent_id}"),
            });
        }
        if !state.methods.contains_key(method_id) {
            return Err(GatewayError::Api {
                status: 404,
                message: format!("No such payment_method: {method_id}"),
            });
        }

        state
            .attached
            .insert(intent_id.clone(), method_id.to_string());
        Ok(())
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.verifier.verify(payload, signature)
    }
}
