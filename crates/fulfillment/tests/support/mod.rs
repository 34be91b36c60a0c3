//! Shared wiring for the fulfillment integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use domain::{Cart, CustomerId, Money, Product, ShippingAddress};
use fulfillment::{
    FulfillmentConfig, InventoryGate, OrderService, PaymentService, ReservationReconciler,
    WebhookProcessor,
};
use gateway::InMemoryGateway;
use serde_json::json;
use store::InMemoryStore;

pub struct TestHarness {
    pub store: InMemoryStore,
    pub gateway: InMemoryGateway,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub webhooks: WebhookProcessor,
    pub reconciler: ReservationReconciler,
    pub config: FulfillmentConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let gateway = InMemoryGateway::new("whsec_test");
        let config = FulfillmentConfig::default();
        let shared = Arc::new(store.clone());
        let gw = Arc::new(gateway.clone());

        Self {
            orders: OrderService::new(
                shared.clone(),
                shared.clone(),
                InventoryGate::new(shared.clone()),
                config,
            ),
            payments: PaymentService::new(gw.clone(), shared.clone(), shared.clone(), config),
            webhooks: WebhookProcessor::new(gw, shared.clone(), shared.clone(), shared.clone()),
            reconciler: ReservationReconciler::new(
                shared.clone(),
                shared,
                config.reservation_ttl,
            ),
            store,
            gateway,
            config,
        }
    }

    /// Products A ($10.00) and B ($25.00) with the given stock.
    pub async fn seed_products(&self, stock_a: u32, stock_b: u32) {
        self.store
            .put_product(Product::new("A", "Widget", Money::from_cents(1000), stock_a))
            .await;
        self.store
            .put_product(Product::new("B", "Gadget", Money::from_cents(2500), stock_b))
            .await;
    }

    /// A customer whose cart holds 2 × A and 1 × B.
    pub async fn customer_with_cart(&self) -> CustomerId {
        let customer_id = CustomerId::new();
        self.store
            .put_cart(
                Cart::new(customer_id)
                    .with_line("A", 2, Money::from_cents(1000))
                    .with_line("B", 1, Money::from_cents(2500)),
            )
            .await;
        customer_id
    }

    /// Signs a webhook body and returns it with its signature header.
    pub fn signed(&self, body: serde_json::Value) -> (Vec<u8>, String) {
        let payload = serde_json::to_vec(&body).unwrap();
        let signature = self.gateway.sign_event(&payload).unwrap();
        (payload, signature)
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress::new("1 Main St", "Springfield", "IL", "62701", "US")
}

pub fn intent_event(event_id: &str, event_type: &str, intent_id: &str, created: i64) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": created,
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
}

pub fn refund_event(event_id: &str, intent_id: &str, created: i64) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "charge.refunded",
        "created": created,
        "data": { "object": { "id": "ch_1", "object": "charge", "payment_intent": intent_id } }
    })
}
