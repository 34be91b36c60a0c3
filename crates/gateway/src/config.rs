use std::time::Duration;

/// Settings for talking to the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, without a trailing slash.
    pub api_base: String,
    pub api_key: String,
    /// Shared secret used to sign webhook deliveries.
    pub webhook_secret: String,
    /// Upper bound on every outbound gateway call.
    pub timeout: Duration,
    /// How far a webhook's signed timestamp may drift from our clock.
    pub signature_tolerance: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            api_key: String::new(),
            webhook_secret: String::new(),
            timeout: Duration::from_secs(10),
            signature_tolerance: Duration::from_secs(300),
        }
    }
}
