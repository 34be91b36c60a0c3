//! Inventory gate: all-or-nothing stock reservation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::ProductId;
use store::{ProductStore, StockDemand, StoreError};

use crate::error::{Result, ServiceError};

/// Verifies and reserves stock for a set of demands.
///
/// Reservation is delegated to [`ProductStore::reserve_stock`], which performs
/// one conditional decrement per product inside a single atomic step, so two
/// concurrent callers can never both take the last units.
#[derive(Clone)]
pub struct InventoryGate {
    products: Arc<dyn ProductStore>,
}

impl InventoryGate {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }

    /// Reserves every demand for `order_id`, or nothing.
    ///
    /// Demands for the same product are merged. Unknown products fail with
    /// `NotFound`, products that are not active with `BadRequest`, and the
    /// first product short of stock with `InsufficientStock`.
    #[tracing::instrument(skip(self, demands), fields(order_id = %order_id, lines = demands.len()))]
    pub async fn reserve(
        &self,
        order_id: OrderId,
        demands: &[StockDemand],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let demands = merge_demands(demands)?;

        for demand in &demands {
            let product = self
                .products
                .get_product(&demand.product_id)
                .await
                .map_err(ServiceError::store("load product"))?
                .ok_or_else(|| ServiceError::not_found("product", &demand.product_id))?;

            if !product.is_orderable() {
                return Err(ServiceError::BadRequest(format!(
                    "product {} is {}",
                    product.id, product.status
                )));
            }
            if product.stock < demand.quantity {
                tracing::debug!(available = product.stock, requested = demand.quantity, "Stock check failed");
                return Err(reject(&demand.product_id));
            }
        }

        match self.products.reserve_stock(order_id, &demands, at).await {
            Ok(()) => {
                tracing::info!(products = demands.len(), "Stock reserved");
                Ok(())
            }
            // Another reservation took the stock between the check and the write.
            Err(StoreError::InsufficientStock { product_id }) => Err(reject(&product_id)),
            Err(e) => Err(ServiceError::store("reserve stock")(e)),
        }
    }

    /// Marks the reservation for `order_id` as accounted for by a stored order.
    pub async fn settle(&self, order_id: OrderId) -> Result<bool> {
        self.products
            .settle_reservation(order_id)
            .await
            .map_err(ServiceError::store("settle reservation"))
    }

    /// Returns the stock reserved for `order_id`.
    pub async fn release(&self, order_id: OrderId) -> Result<bool> {
        self.products
            .release_reservation(order_id)
            .await
            .map_err(ServiceError::store("release reservation"))
    }
}

fn reject(product_id: &ProductId) -> ServiceError {
    metrics::counter!("inventory_reservations_rejected_total").increment(1);
    tracing::warn!(%product_id, "Insufficient stock");
    ServiceError::InsufficientStock {
        product_id: product_id.clone(),
    }
}

/// Sums demands per product, ordered by product id.
fn merge_demands(demands: &[StockDemand]) -> Result<Vec<StockDemand>> {
    if demands.is_empty() {
        return Err(ServiceError::BadRequest("nothing to reserve".to_string()));
    }

    let mut merged: BTreeMap<&ProductId, u32> = BTreeMap::new();
    for demand in demands {
        if demand.quantity == 0 {
            return Err(ServiceError::BadRequest(format!(
                "quantity for product {} must be greater than 0",
                demand.product_id
            )));
        }
        let total = merged.entry(&demand.product_id).or_insert(0);
        *total = total.checked_add(demand.quantity).ok_or_else(|| {
            ServiceError::BadRequest(format!("quantity overflow for product {}", demand.product_id))
        })?;
    }

    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| StockDemand::new(product_id.clone(), quantity))
        .collect())
}
