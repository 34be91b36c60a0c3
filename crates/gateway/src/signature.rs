//! Webhook signature verification.
//!
//! Deliveries carry a header of the form `t=<unix seconds>,v1=<hex>` where the
//! hex value is HMAC-SHA256 over `"{t}.{raw body}"` keyed by the shared webhook
//! secret. Several `v1` entries may be present during secret rotation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::{GatewayError, Result, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

#[derive(Deserialize)]
struct RawEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    created: Option<i64>,
    data: Option<RawData>,
}

#[derive(Deserialize)]
struct RawData {
    #[serde(default)]
    object: serde_json::Value,
}

/// Verifies signed webhook deliveries and parses their envelope.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<WebhookEvent> {
        self.verify_at(payload, header, Utc::now())
    }

    /// Verifies against an explicit clock.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<WebhookEvent> {
        let (timestamp, signatures) = parse_header(header)?;

        if now.timestamp().abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(GatewayError::InvalidSignature(
                "timestamp outside tolerance".to_string(),
            ));
        }

        let mut matched = false;
        for candidate in signatures {
            let Ok(bytes) = hex::decode(candidate) else {
                continue;
            };
            if self.mac(timestamp, payload)?.verify_slice(&bytes).is_ok() {
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(GatewayError::InvalidSignature(
                "no matching v1 signature".to_string(),
            ));
        }

        parse_event(payload)
    }

    /// Produces the signature header for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.trim().parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value.trim()),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }
    Ok((timestamp, signatures))
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

    let event_type = raw
        .event_type
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::MalformedPayload("missing event type".to_string()))?;

    Ok(WebhookEvent {
        id: raw.id.filter(|id| !id.is_empty()),
        event_type,
        created: raw
            .created
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        object: raw.data.map(|d| d.object).unwrap_or_default(),
    })
}
