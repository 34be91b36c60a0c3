//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;

/// Errors raised by domain validation and state machine rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The requested order status change is not an edge of the order graph.
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The requested payment status change is not an edge of the payment graph.
    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid unit price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: String, price: i64 },

    /// A line or order total does not fit in an `i64` of cents.
    #[error("Amount overflow computing the total for {product_id}")]
    AmountOverflow { product_id: String },

    /// A required shipping address field is blank.
    #[error("Invalid shipping address: {field} is required")]
    InvalidAddress { field: &'static str },

    /// The cart has no lines to order.
    #[error("empty cart")]
    EmptyCart,

    /// Payment amount must be positive.
    #[error("Invalid amount: {0} (must be greater than 0)")]
    InvalidAmount(i64),

    /// Currency is not a three-letter code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// A status string did not name a known status.
    #[error("Unknown {kind} status: {value:?}")]
    UnknownStatus { kind: &'static str, value: String },
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
