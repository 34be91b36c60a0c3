//! Payment creation and payment reads.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, Page, PageRequest};
use domain::{Currency, CustomerId, DomainError, Money, Payment, PaymentId, is_card_like};
use gateway::{IntentRequest, PaymentGateway};
use serde::{Deserialize, Serialize};
use store::{OrderStore, PaymentStore};

use crate::config::FulfillmentConfig;
use crate::error::{Result, ServiceError};

/// A request to start collecting a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub customer_id: CustomerId,
    /// Minor currency units.
    pub amount: Money,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    pub payment_method: String,
    /// Client-side card token; only used for card-like methods.
    #[serde(default)]
    pub payment_method_token: Option<String>,
    /// Order this payment settles, if any.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

/// What the caller needs to complete authorization client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePaymentResult {
    pub payment: Payment,
    pub client_secret: String,
    /// Gateway status of the intent.
    pub status: String,
}

/// Drives the create-payment flow against the gateway.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    config: FulfillmentConfig,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            gateway,
            payments,
            orders,
            config,
        }
    }

    /// Creates a payment intent, attaches the card if one was supplied, and
    /// records the pending payment under the gateway's intent id.
    ///
    /// Any gateway failure aborts before anything is written locally.
    #[tracing::instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, amount = request.amount.cents())
    )]
    pub async fn create_payment(&self, request: CreatePaymentRequest) -> Result<CreatePaymentResult> {
        let currency = Currency::parse(&request.currency)?;
        if !request.amount.is_positive() {
            return Err(DomainError::InvalidAmount(request.amount.cents()).into());
        }
        if request.payment_method.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "payment method is required".to_string(),
            ));
        }
        if let Some(order_id) = request.order_id {
            self.check_order_payable(order_id, &request).await?;
        }

        let intent = self
            .gateway
            .create_payment_intent(&IntentRequest {
                amount: request.amount,
                currency: currency.clone(),
                description: request.description.clone(),
                customer_id: request.customer_id,
            })
            .await
            .map_err(ServiceError::gateway("create payment intent"))?;

        if is_card_like(&request.payment_method)
            && let Some(token) = request
                .payment_method_token
                .as_deref()
                .filter(|t| !t.is_empty())
        {
            let method_id = self
                .gateway
                .create_payment_method_from_token(token)
                .await
                .map_err(ServiceError::gateway("create payment method"))?;
            self.gateway
                .attach_payment_method(&method_id, &intent.id)
                .await
                .map_err(ServiceError::gateway("attach payment method"))?;
            tracing::debug!(payment_id = %intent.id, "Payment method attached");
        }

        let now = Utc::now();
        let payment = Payment::pending(
            intent.id.clone(),
            request.customer_id,
            request.amount,
            currency,
            request.description,
            request.payment_method,
            now,
        )?;
        self.payments
            .create_payment(&payment)
            .await
            .map_err(ServiceError::store("create payment"))?;

        if let Some(order_id) = request.order_id {
            let linked = self
                .orders
                .set_payment_intent(order_id, &payment.id, now)
                .await
                .map_err(ServiceError::store("link payment to order"))?;
            if !linked {
                tracing::warn!(%order_id, payment_id = %payment.id, "Order was linked to another payment concurrently");
                return Err(ServiceError::Conflict(format!(
                    "order {order_id} already has a payment"
                )));
            }
        }

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(payment_id = %payment.id, "Payment created");

        Ok(CreatePaymentResult {
            payment,
            client_secret: intent.client_secret,
            status: intent.status,
        })
    }

    async fn check_order_payable(
        &self,
        order_id: OrderId,
        request: &CreatePaymentRequest,
    ) -> Result<()> {
        let order = self
            .orders
            .get_order(order_id)
            .await
            .map_err(ServiceError::store("load order"))?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        if order.customer_id != request.customer_id {
            return Err(ServiceError::BadRequest(format!(
                "order {order_id} belongs to another customer"
            )));
        }
        if let Some(existing) = &order.payment_intent_id {
            return Err(ServiceError::Conflict(format!(
                "order {order_id} already has payment {existing}"
            )));
        }
        if order.total_amount != request.amount {
            return Err(ServiceError::BadRequest(format!(
                "amount {} does not match order total {}",
                request.amount, order.total_amount
            )));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, id: &PaymentId) -> Result<Payment> {
        self.payments
            .get_payment(id)
            .await
            .map_err(ServiceError::store("load payment"))?
            .ok_or_else(|| ServiceError::not_found("payment", id))
    }

    /// Lists a customer's payments, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_payments(
        &self,
        customer_id: CustomerId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        self.payments
            .list_payments_by_customer(customer_id, page.normalize(self.config.page_limits))
            .await
            .map_err(ServiceError::store("list payments"))
    }
}
