//! Gateway webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use fulfillment::WebhookOutcome;

use crate::AppState;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// POST /webhooks/payments — verify and apply a gateway event.
///
/// Duplicate, stale and unhandled events still answer 200 so the gateway
/// stops redelivering them.
#[tracing::instrument(skip_all)]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {SIGNATURE_HEADER} header")))?;

    Ok(Json(state.webhooks.process_webhook(&body, signature).await?))
}
