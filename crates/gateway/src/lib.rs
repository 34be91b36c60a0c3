//! Boundary to the external payment processor.
//!
//! [`PaymentGateway`] is the capability set the payment and webhook services
//! consume. [`StripeGateway`] talks to a Stripe-compatible HTTP API;
//! [`InMemoryGateway`] is a scriptable double for tests and local runs.

pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod signature;
pub mod stripe;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{IntentRequest, PaymentGateway, PaymentIntent, WebhookEvent};
pub use memory::InMemoryGateway;
pub use signature::WebhookVerifier;
pub use stripe::StripeGateway;
