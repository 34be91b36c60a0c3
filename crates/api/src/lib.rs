//! HTTP API server with observability for the fulfillment core.
//!
//! Provides REST endpoints for orders, payments and gateway webhooks,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::{
    FulfillmentConfig, InventoryGate, OrderService, PaymentService, ReservationReconciler,
    WebhookProcessor,
};
use gateway::PaymentGateway;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CartStore, OrderStore, PaymentStore, ProductStore, WebhookEventLog};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub payments: PaymentService,
    pub webhooks: WebhookProcessor,
    pub reconciler: ReservationReconciler,
}

impl AppState {
    /// Wires every service onto one store and one gateway.
    pub fn new<S>(store: Arc<S>, gateway: Arc<dyn PaymentGateway>, config: FulfillmentConfig) -> Self
    where
        S: CartStore + ProductStore + OrderStore + PaymentStore + WebhookEventLog + 'static,
    {
        Self {
            orders: OrderService::new(
                store.clone(),
                store.clone(),
                InventoryGate::new(store.clone()),
                config,
            ),
            payments: PaymentService::new(gateway.clone(), store.clone(), store.clone(), config),
            webhooks: WebhookProcessor::new(gateway, store.clone(), store.clone(), store.clone()),
            reconciler: ReservationReconciler::new(store.clone(), store, config.reservation_ttl),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", post(routes::orders::update_status))
        .route(
            "/customers/{id}/orders",
            get(routes::orders::list_for_customer),
        )
        .route("/payments", post(routes::payments::create))
        .route("/payments/{id}", get(routes::payments::get))
        .route(
            "/customers/{id}/payments",
            get(routes::payments::list_for_customer),
        )
        .route("/webhooks/payments", post(routes::webhooks::receive))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
