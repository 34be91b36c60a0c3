//! Gateway error types.

use thiserror::Error;

/// Errors returned by the payment gateway or while verifying its webhooks.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request did not complete within the configured timeout.
    #[error("Gateway request timed out")]
    Timeout,

    /// The request could not be sent or the response could not be read.
    #[error("Gateway transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("Gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The gateway declined the payment method or intent.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// A webhook signature header is missing, malformed, expired or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// A signed webhook body is not a well-formed event.
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl GatewayError {
    /// Maps a reqwest failure, keeping timeouts distinct.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err)
        }
    }
}

/// Convenience type alias for gateway results.
pub type Result<T> = std::result::Result<T, GatewayError>;
