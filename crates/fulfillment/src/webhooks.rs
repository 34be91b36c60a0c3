//! Idempotent application of gateway webhook deliveries.

use std::sync::Arc;

use chrono::Utc;
use domain::{PaymentId, PaymentStatus, PaymentTransition};
use gateway::{PaymentGateway, WebhookEvent};
use serde::Serialize;
use store::{OrderStore, PaymentStore, WebhookEventLog};

use crate::error::{Result, ServiceError};
use crate::orders::MAX_CAS_ATTEMPTS;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// What a delivery did to local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The payment moved to `status`.
    Applied {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// The event, or its effect, was already recorded.
    Duplicate,
    /// The event is older than what the payment already reflects.
    Stale {
        payment_id: PaymentId,
        current: PaymentStatus,
        reported: PaymentStatus,
    },
    /// An event type we do not act on.
    Ignored { event_type: String },
}

impl WebhookOutcome {
    fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Stale { .. } => "stale",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Verifies and applies payment outcome notifications.
#[derive(Clone)]
pub struct WebhookProcessor {
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    events: Arc<dyn WebhookEventLog>,
}

impl WebhookProcessor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
        events: Arc<dyn WebhookEventLog>,
    ) -> Self {
        Self {
            gateway,
            payments,
            orders,
            events,
        }
    }

    /// Verifies `payload` against `signature` and applies the event.
    ///
    /// Redeliveries, out-of-order events and unknown event types are
    /// successful no-ops; see [`WebhookOutcome`]. An event that skips ahead of
    /// the payment's next status (a refund before its success) is a
    /// `Conflict` and is left unrecorded so a redelivery can apply it.
    #[tracing::instrument(skip_all, fields(event_type = tracing::field::Empty))]
    pub async fn process_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = self
            .gateway
            .verify_webhook_signature(payload, signature)
            .map_err(|e| {
                record("unverified", "rejected");
                tracing::warn!(error = %e, "Webhook signature rejected");
                ServiceError::ThirdParty {
                    operation: "verify webhook signature",
                    source: e,
                }
            })?;

        tracing::Span::current().record("event_type", event.event_type.as_str());

        match self.dispatch(&event).await {
            Ok(outcome) => {
                record(&event.event_type, outcome.label());
                Ok(outcome)
            }
            Err(e) => {
                record(&event.event_type, "error");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        if let Some(event_id) = &event.id
            && self
                .events
                .is_processed(event_id)
                .await
                .map_err(ServiceError::store("check processed event"))?
        {
            tracing::warn!(%event_id, event_type = %event.event_type, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match event.event_type.as_str() {
            PAYMENT_SUCCEEDED => {
                self.apply(event, intent_id(event, "id")?, PaymentStatus::Succeeded)
                    .await?
            }
            PAYMENT_FAILED => {
                self.apply(event, intent_id(event, "id")?, PaymentStatus::Failed)
                    .await?
            }
            CHARGE_REFUNDED => {
                self.apply(
                    event,
                    intent_id(event, "payment_intent")?,
                    PaymentStatus::Refunded,
                )
                .await?
            }
            other => {
                tracing::debug!(event_type = other, "Ignoring webhook event");
                WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                }
            }
        };

        if let Some(event_id) = &event.id {
            self.events
                .mark_processed(event_id, &event.event_type, Utc::now())
                .await
                .map_err(ServiceError::store("record processed event"))?;
        }

        Ok(outcome)
    }

    async fn apply(
        &self,
        event: &WebhookEvent,
        payment_id: PaymentId,
        reported: PaymentStatus,
    ) -> Result<WebhookOutcome> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let payment = self
                .payments
                .get_payment(&payment_id)
                .await
                .map_err(ServiceError::store("load payment"))?
                .ok_or_else(|| {
                    tracing::warn!(%payment_id, "Webhook for unknown payment");
                    ServiceError::not_found("payment", &payment_id)
                })?;

            let current = payment.status;
            if payment.is_older_than_last_event(event.created) {
                tracing::warn!(%payment_id, %current, %reported, "Stale webhook event");
                return Ok(WebhookOutcome::Stale {
                    payment_id,
                    current,
                    reported,
                });
            }

            match current.assess(reported) {
                PaymentTransition::AlreadyApplied => {
                    // Re-mirroring heals an order update lost on an earlier delivery.
                    self.mirror_to_order(&payment_id, reported).await?;
                    tracing::warn!(%payment_id, %current, "Payment already in reported status");
                    return Ok(WebhookOutcome::Duplicate);
                }
                PaymentTransition::Premature => {
                    // Not recorded as processed, so the gateway's retry applies
                    // once the intermediate status lands.
                    tracing::warn!(%payment_id, %current, %reported, "Webhook event ahead of payment status");
                    return Err(ServiceError::Conflict(format!(
                        "payment {payment_id} is {current}; cannot apply {reported} yet"
                    )));
                }
                PaymentTransition::Stale => {
                    tracing::warn!(%payment_id, %current, %reported, "Out-of-order webhook event");
                    return Ok(WebhookOutcome::Stale {
                        payment_id,
                        current,
                        reported,
                    });
                }
                PaymentTransition::Apply => {
                    let changed = self
                        .payments
                        .update_payment_status(&payment_id, current, reported, event.created, Utc::now())
                        .await
                        .map_err(ServiceError::store("update payment status"))?;
                    if changed {
                        self.mirror_to_order(&payment_id, reported).await?;
                        tracing::info!(%payment_id, from = %current, to = %reported, "Payment status changed");
                        return Ok(WebhookOutcome::Applied {
                            payment_id,
                            status: reported,
                        });
                    }
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "payment {payment_id} changed concurrently"
        )))
    }

    async fn mirror_to_order(&self, payment_id: &PaymentId, status: PaymentStatus) -> Result<()> {
        let order_id = self
            .orders
            .update_payment_status_by_intent(payment_id, status, Utc::now())
            .await
            .map_err(ServiceError::store("mirror payment status to order"))?;
        if let Some(order_id) = order_id {
            tracing::debug!(%order_id, %payment_id, %status, "Order payment status updated");
        }
        Ok(())
    }
}

fn intent_id(event: &WebhookEvent, field: &str) -> Result<PaymentId> {
    event.object_str(field).map(PaymentId::new).ok_or_else(|| {
        tracing::error!(event_type = %event.event_type, field, "Verified webhook is missing a field");
        ServiceError::MalformedEvent(format!("{} event has no {field}", event.event_type))
    })
}

fn record(event_type: &str, outcome: &'static str) {
    metrics::counter!(
        "webhook_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
