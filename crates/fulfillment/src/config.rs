use std::time::Duration;

use common::PageLimits;

/// Tunables shared by the fulfillment services.
#[derive(Debug, Clone, Copy)]
pub struct FulfillmentConfig {
    pub page_limits: PageLimits,
    /// How long a reservation may stay unsettled before reconciliation
    /// looks at it.
    pub reservation_ttl: Duration,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            page_limits: PageLimits::default(),
            reservation_ttl: Duration::from_secs(15 * 60),
        }
    }
}
