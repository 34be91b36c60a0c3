//! Persistence layer for the fulfillment core.
//!
//! The traits in [`store`] are the only way the services touch durable state.
//! Two implementations are provided with identical semantics:
//! [`InMemoryStore`] for tests and zero-config runs, and [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{
    CartStore, OrderStore, PaymentStore, ProductStore, Reservation, StockDemand, WebhookEventLog,
};
