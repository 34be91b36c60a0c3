//! Order assembly and order status changes.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, Page, PageRequest};
use domain::{CustomerId, Order, OrderStatus, ShippingAddress};
use store::{CartStore, OrderStore, StockDemand};

use crate::config::FulfillmentConfig;
use crate::error::{Result, ServiceError};
use crate::inventory::InventoryGate;

/// Compare-and-set attempts before a status change gives up as a conflict.
pub(crate) const MAX_CAS_ATTEMPTS: usize = 5;

/// Turns carts into orders and drives the order status machine.
#[derive(Clone)]
pub struct OrderService {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    inventory: InventoryGate,
    config: FulfillmentConfig,
}

impl OrderService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        inventory: InventoryGate,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            carts,
            orders,
            inventory,
            config,
        }
    }

    /// Creates an order from the customer's cart.
    ///
    /// Stock is reserved before the order is written. If the write fails the
    /// reservation is left in the ledger for [`crate::ReservationReconciler`]
    /// and the error is returned; stock is never given back here.
    #[tracing::instrument(skip(self, shipping_address), fields(customer_id = %customer_id))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        let started = Instant::now();

        let cart = self
            .carts
            .get_cart(customer_id)
            .await
            .map_err(ServiceError::store("load cart"))?
            .ok_or_else(|| ServiceError::not_found("cart", customer_id))?;

        if cart.is_empty() {
            return Err(ServiceError::BadRequest("empty cart".to_string()));
        }

        let now = Utc::now();
        let order = Order::from_cart(&cart, shipping_address, now)?;
        let demands: Vec<StockDemand> = order
            .items
            .iter()
            .map(|item| StockDemand::new(item.product_id.clone(), item.quantity))
            .collect();

        self.inventory.reserve(order.id, &demands, now).await?;

        if let Err(source) = self.orders.create_order(&order).await {
            tracing::error!(
                order_id = %order.id,
                products = ?demands,
                error = %source,
                "Order write failed after stock was reserved; reservation left for reconciliation"
            );
            return Err(ServiceError::Database {
                operation: "create order",
                source,
            });
        }

        // A failed settle only delays cleanup: the reconciler settles entries
        // whose order exists.
        if let Err(e) = self.inventory.settle(order.id).await {
            tracing::warn!(order_id = %order.id, error = %e, "Could not settle reservation");
        }

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            items = order.item_count(),
            total = %order.total_amount,
            "Order created"
        );

        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get_order(id)
            .await
            .map_err(ServiceError::store("load order"))?
            .ok_or_else(|| ServiceError::not_found("order", id))
    }

    /// Lists a customer's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        self.orders
            .list_orders_by_customer(customer_id, page.normalize(self.config.page_limits))
            .await
            .map_err(ServiceError::store("list orders"))
    }

    /// Moves an order to `new_status` if the order graph allows it.
    ///
    /// A rejected transition leaves the order untouched.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, id: OrderId, new_status: OrderStatus) -> Result<Order> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut order = self.get_order(id).await?;
            let from = order.status;
            from.transition_to(new_status)?;

            let now = Utc::now();
            let changed = self
                .orders
                .update_order_status(id, from, new_status, now)
                .await
                .map_err(ServiceError::store("update order status"))?;

            if changed {
                tracing::info!(order_id = %id, %from, to = %new_status, "Order status changed");
                order.status = new_status;
                order.updated_at = now;
                return Ok(order);
            }
            tracing::debug!(order_id = %id, "Order status changed concurrently, retrying");
        }

        Err(ServiceError::Conflict(format!(
            "order {id} changed concurrently"
        )))
    }
}
