use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest};
use domain::{
    Cart, CustomerId, Order, OrderStatus, Payment, PaymentId, PaymentStatus, Product, ProductId,
};

use crate::Result;

/// A request to take `quantity` units of a product out of stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StockDemand {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockDemand {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Stock taken for an order that has not yet been settled against a
/// persisted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub order_id: OrderId,
    pub items: Vec<StockDemand>,
    pub created_at: DateTime<Utc>,
}

/// Read access to carts owned by the cart service.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, customer_id: CustomerId) -> Result<Option<Cart>>;
}

/// Stock reads and writes against the catalog.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Takes every demand out of stock, all or nothing, and records a
    /// reservation ledger entry for `order_id`.
    ///
    /// Fails with `InsufficientStock` naming the first product that could not
    /// be satisfied; in that case no stock is taken.
    async fn reserve_stock(
        &self,
        order_id: OrderId,
        demands: &[StockDemand],
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Drops the ledger entry for an order whose write succeeded.
    ///
    /// Returns `false` if there was no entry.
    async fn settle_reservation(&self, order_id: OrderId) -> Result<bool>;

    /// Returns the reserved stock for `order_id` and drops its ledger entry.
    ///
    /// Returns `false` if there was no entry.
    async fn release_reservation(&self, order_id: OrderId) -> Result<bool>;

    /// Ledger entries created strictly before `created_before`, oldest first.
    async fn unsettled_reservations(&self, created_before: DateTime<Utc>)
    -> Result<Vec<Reservation>>;
}

/// Orders and their item snapshots.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and all of its items in one atomic step.
    async fn create_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Newest orders first.
    async fn list_orders_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Order>>;

    /// Compare-and-set of the order status. Returns `false` if the order is
    /// missing or no longer in `from`.
    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Links a payment intent to an order that has none yet.
    async fn set_payment_intent(
        &self,
        id: OrderId,
        payment_id: &PaymentId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Mirrors a payment outcome onto the order referencing `payment_id`.
    ///
    /// The order's payment status only moves forward along the payment graph:
    /// the write is skipped when the order already holds a status that cannot
    /// lead to `status`. Returns the id of the order that was updated, if any.
    async fn update_payment_status_by_intent(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderId>>;
}

/// Local payment records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;

    /// Newest payments first.
    async fn list_payments_by_customer(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Payment>>;

    /// Compare-and-set of the payment status, also recording the gateway
    /// timestamp of the event that caused it. Returns `false` if the payment
    /// is missing or no longer in `from`.
    async fn update_payment_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        event_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Ids of gateway events that have already been applied.
#[async_trait]
pub trait WebhookEventLog: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;

    /// Records an event id. Returns `false` if it was already recorded.
    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}
