//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::AppState;
use api::config::{Config, LogFormat};
use gateway::{InMemoryGateway, PaymentGateway, StripeGateway};
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    if config.payment_webhook_secret.is_empty() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET is not set; webhook signatures use an empty key");
    }
    if config.payment_gateway_api_key.is_some() {
        tracing::info!(api_base = %config.payment_gateway_url, "using HTTP payment gateway");
        Arc::new(
            StripeGateway::new(&config.gateway_config())
                .expect("failed to build payment gateway client"),
        )
    } else {
        tracing::warn!("PAYMENT_GATEWAY_API_KEY is not set; using in-memory payment gateway");
        Arc::new(InMemoryGateway::new(config.payment_webhook_secret.clone()))
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create store, gateway and application state
    let gateway = payment_gateway(&config);
    let state = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            AppState::new(Arc::new(store), gateway, config.fulfillment_config())
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using in-memory store");
            AppState::new(
                Arc::new(InMemoryStore::new()),
                gateway,
                config.fulfillment_config(),
            )
        }
    };

    // 4. Reconcile reservations left behind by failed order writes
    let reconciler = state
        .reconciler
        .clone()
        .spawn(config.reservation_ttl.max(Duration::from_secs(1)));

    // 5. Build the application
    let app = api::create_app(Arc::new(state), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    reconciler.abort();
    tracing::info!("server shut down gracefully");
}
