//! Order fulfillment and payment settlement services.
//!
//! - [`InventoryGate`] reserves stock all-or-nothing.
//! - [`OrderService`] turns carts into orders and drives order status.
//! - [`PaymentService`] creates gateway payment intents and local payments.
//! - [`WebhookProcessor`] applies verified gateway notifications idempotently.
//! - [`ReservationReconciler`] returns stock taken for orders that were never stored.

pub mod config;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod reconcile;
pub mod webhooks;

pub use config::FulfillmentConfig;
pub use error::{ErrorKind, Result, ServiceError};
pub use inventory::InventoryGate;
pub use orders::OrderService;
pub use payments::{CreatePaymentRequest, CreatePaymentResult, PaymentService};
pub use reconcile::{ReconcileReport, ReservationReconciler};
pub use webhooks::{WebhookOutcome, WebhookProcessor};
