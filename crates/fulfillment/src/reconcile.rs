//! Cleanup of reservations whose order was never written.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use store::{OrderStore, ProductStore};

use crate::error::{Result, ServiceError};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries whose order turned out to exist.
    pub settled: usize,
    /// Entries whose stock was returned.
    pub released: usize,
}

/// Resolves reservation ledger entries older than the TTL.
///
/// An entry whose order exists is settled; otherwise the order write failed
/// after stock was taken and the stock is returned.
#[derive(Clone)]
pub struct ReservationReconciler {
    products: Arc<dyn ProductStore>,
    orders: Arc<dyn OrderStore>,
    ttl: Duration,
}

impl ReservationReconciler {
    pub fn new(products: Arc<dyn ProductStore>, orders: Arc<dyn OrderStore>, ttl: Duration) -> Self {
        Self {
            products,
            orders,
            ttl,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let Some(cutoff) = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(report);
        };

        let entries = self
            .products
            .unsettled_reservations(cutoff)
            .await
            .map_err(ServiceError::store("list unsettled reservations"))?;

        for entry in entries {
            let order = self
                .orders
                .get_order(entry.order_id)
                .await
                .map_err(ServiceError::store("load order"))?;

            if order.is_some() {
                if self
                    .products
                    .settle_reservation(entry.order_id)
                    .await
                    .map_err(ServiceError::store("settle reservation"))?
                {
                    report.settled += 1;
                }
            } else if self
                .products
                .release_reservation(entry.order_id)
                .await
                .map_err(ServiceError::store("release reservation"))?
            {
                tracing::warn!(
                    order_id = %entry.order_id,
                    items = ?entry.items,
                    "Released stock reserved for an order that was never stored"
                );
                report.released += 1;
            }
        }

        if report.settled + report.released > 0 {
            tracing::info!(settled = report.settled, released = report.released, "Reservations reconciled");
        }
        Ok(report)
    }

    /// Runs a pass every `every` until the task is aborted.
    pub fn spawn(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run(Utc::now()).await {
                    tracing::error!(error = %e, "Reservation reconciliation failed");
                }
            }
        })
    }
}
