//! Domain layer for the fulfillment core.
//!
//! This crate provides the data model the services operate on:
//! - Order snapshots with the `Pending → Confirmed → Shipping → Delivered` state machine
//! - Payment records keyed by the gateway's intent id, with their own state machine
//! - Read-only views of carts and products owned by other subsystems

pub mod cart;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::{Cart, CartLine};
pub use common::OrderId;
pub use error::{DomainError, Result};
pub use order::{
    CustomerId, Money, Order, OrderItem, OrderItemId, OrderStatus, ProductId, ShippingAddress,
};
pub use payment::{Currency, Payment, PaymentId, PaymentStatus, PaymentTransition, is_card_like};
pub use product::{Product, ProductStatus};
