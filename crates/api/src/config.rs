//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::PageLimits;
use fulfillment::FulfillmentConfig;
use gateway::GatewayConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON lines, anything else for human output
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `PAYMENT_GATEWAY_URL` — gateway API base (default: `https://api.stripe.com`)
/// - `PAYMENT_GATEWAY_API_KEY` — gateway secret key; unset runs on the in-memory gateway
/// - `PAYMENT_WEBHOOK_SECRET` — webhook signing secret
/// - `PAYMENT_GATEWAY_TIMEOUT_SECS` — per-call gateway timeout (default: `10`)
/// - `DEFAULT_PAGE_SIZE` / `MAX_PAGE_SIZE` — list paging (default: `10` / `100`)
/// - `RESERVATION_TTL_SECS` — age before an unsettled reservation is reconciled (default: `900`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payment_gateway_url: String,
    pub payment_gateway_api_key: Option<String>,
    pub payment_webhook_secret: String,
    pub payment_gateway_timeout: Duration,
    pub page_limits: PageLimits,
    pub reservation_ttl: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT") {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            payment_gateway_url: non_empty("PAYMENT_GATEWAY_URL")
                .unwrap_or(defaults.payment_gateway_url),
            payment_gateway_api_key: non_empty("PAYMENT_GATEWAY_API_KEY"),
            payment_webhook_secret: non_empty("PAYMENT_WEBHOOK_SECRET")
                .unwrap_or(defaults.payment_webhook_secret),
            payment_gateway_timeout: parsed("PAYMENT_GATEWAY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.payment_gateway_timeout),
            page_limits: PageLimits {
                default_page_size: parsed("DEFAULT_PAGE_SIZE")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(defaults.page_limits.default_page_size),
                max_page_size: parsed("MAX_PAGE_SIZE")
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(defaults.page_limits.max_page_size),
            },
            reservation_ttl: parsed("RESERVATION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reservation_ttl),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            api_base: self.payment_gateway_url.clone(),
            api_key: self.payment_gateway_api_key.clone().unwrap_or_default(),
            webhook_secret: self.payment_webhook_secret.clone(),
            timeout: self.payment_gateway_timeout,
            ..GatewayConfig::default()
        }
    }

    pub fn fulfillment_config(&self) -> FulfillmentConfig {
        FulfillmentConfig {
            page_limits: self.page_limits,
            reservation_ttl: self.reservation_ttl,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let gateway = GatewayConfig::default();
        let fulfillment = FulfillmentConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            payment_gateway_url: gateway.api_base,
            payment_gateway_api_key: None,
            payment_webhook_secret: String::new(),
            payment_gateway_timeout: gateway.timeout,
            page_limits: fulfillment.page_limits,
            reservation_ttl: fulfillment.reservation_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert!(config.payment_gateway_api_key.is_none());
        assert_eq!(config.page_limits.default_page_size, 10);
        assert_eq!(config.page_limits.max_page_size, 100);
        assert_eq!(config.reservation_ttl, Duration::from_secs(900));
        assert_eq!(config.payment_gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_every_variable() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/fulfillment"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("PAYMENT_GATEWAY_URL", "http://localhost:12111"),
            ("PAYMENT_GATEWAY_API_KEY", "sk_test_1"),
            ("PAYMENT_WEBHOOK_SECRET", "whsec_1"),
            ("PAYMENT_GATEWAY_TIMEOUT_SECS", "3"),
            ("DEFAULT_PAGE_SIZE", "20"),
            ("MAX_PAGE_SIZE", "50"),
            ("RESERVATION_TTL_SECS", "60"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/fulfillment")
        );
        assert_eq!(config.database_max_connections, 4);

        let gateway = config.gateway_config();
        assert_eq!(gateway.api_base, "http://localhost:12111");
        assert_eq!(gateway.api_key, "sk_test_1");
        assert_eq!(gateway.webhook_secret, "whsec_1");
        assert_eq!(gateway.timeout, Duration::from_secs(3));

        let fulfillment = config.fulfillment_config();
        assert_eq!(fulfillment.page_limits.default_page_size, 20);
        assert_eq!(fulfillment.page_limits.max_page_size, 50);
        assert_eq!(fulfillment.reservation_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_blank_and_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("DATABASE_URL", "  "),
            ("PAYMENT_GATEWAY_API_KEY", ""),
            ("MAX_PAGE_SIZE", "-1"),
        ]);
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.payment_gateway_api_key.is_none());
        assert_eq!(config.page_limits.max_page_size, 100);
    }
}
