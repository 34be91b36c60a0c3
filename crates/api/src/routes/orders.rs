//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, Page, PageRequest};
use domain::{CustomerId, Order, OrderStatus, ShippingAddress};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    pub shipping_address: ShippingAddress,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /orders — create an order from the customer's cart.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(req.customer_id, req.shipping_address)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orders.get_order(id).await?))
}

/// GET /customers/{id}/orders?page=&page_size=
#[tracing::instrument(skip(state))]
pub async fn list_for_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>, ApiError> {
    let customer_id: CustomerId = parse_id("customer", &customer_id)?;
    Ok(Json(state.orders.list_orders(customer_id, page).await?))
}

/// POST /orders/{id}/status — move an order along its status graph.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = parse_id("order", &id)?;
    let status: OrderStatus = req.status.parse()?;
    Ok(Json(state.orders.update_order_status(id, status).await?))
}
