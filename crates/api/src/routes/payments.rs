//! Payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Page, PageRequest};
use domain::{CustomerId, Payment, PaymentId};
use fulfillment::{CreatePaymentRequest, CreatePaymentResult};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// POST /payments — create a gateway intent and a pending payment.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResult>), ApiError> {
    let result = state.payments.create_payment(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.payments.get_payment(&PaymentId::new(id)).await?))
}

/// GET /customers/{id}/payments?page=&page_size=
#[tracing::instrument(skip(state))]
pub async fn list_for_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Payment>>, ApiError> {
    let customer_id: CustomerId = parse_id("customer", &customer_id)?;
    Ok(Json(state.payments.list_payments(customer_id, page).await?))
}
