//! Order snapshot and its line items.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CustomerId, Money, OrderStatus, ProductId, ShippingAddress};
use crate::cart::Cart;
use crate::error::DomainError;
use crate::payment::{PaymentId, PaymentStatus};

/// Unique identifier for an order line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(Uuid);

impl OrderItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable line of an order, priced at the moment the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A placed order.
///
/// `total_amount` and `items` are frozen when the order is assembled; only the
/// two status fields and the payment reference change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
    pub payment_intent_id: Option<PaymentId>,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Snapshots a cart into a new pending order.
    ///
    /// Unit prices are copied from the cart lines, so later catalog price
    /// changes never reach the order.
    pub fn from_cart(
        cart: &Cart,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        shipping_address.validate()?;
        if cart.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let id = OrderId::new();
        let items = cart
            .lines()
            .map(|(product_id, line)| {
                if line.quantity == 0 {
                    return Err(DomainError::InvalidQuantity {
                        product_id: product_id.to_string(),
                        quantity: line.quantity,
                    });
                }
                if line.unit_price.is_negative() {
                    return Err(DomainError::InvalidPrice {
                        product_id: product_id.to_string(),
                        price: line.unit_price.cents(),
                    });
                }
                Ok(OrderItem {
                    id: OrderItemId::new(),
                    order_id: id,
                    product_id: product_id.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    created_at: now,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total_amount = items.iter().try_fold(Money::zero(), |total, item| {
            item.unit_price
                .checked_multiply(item.quantity)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| DomainError::AmountOverflow {
                    product_id: item.product_id.to_string(),
                })
        })?;

        Ok(Self {
            id,
            customer_id: cart.customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount,
            payment_intent_id: None,
            shipping_address,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Recomputes Σ(quantity × unit_price) over the item snapshot.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
