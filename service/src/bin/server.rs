//! Fulfillment server binary.
//!
//! Connects to `PostgreSQL` and Redpanda, starts the packing and status
//! consumers, and runs until Ctrl+C or SIGTERM.

use anyhow::Context;
use fulfillment_runtime::metrics::MetricsServer;
use fulfillment_runtime::shutdown::shutdown_signal;
use fulfillment_service::{Config, FulfillmentApp};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fulfillment=debug,sqlx=warn".into()),
        )
        .with(fmt::layer())
        .init();

    info!("Starting fulfillment server...");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        brokers = %config.redpanda.brokers,
        shelf_topic = %config.topics.shelf,
        status_topic = %config.topics.status,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start().context("Failed to start metrics server")?;

    let app = FulfillmentApp::connect(config)
        .await
        .context("Failed to initialize fulfillment service")?;
    app.start().await.context("Failed to start consumers")?;
    info!("Fulfillment server running");

    shutdown_signal().await;

    let stopped = app.shutdown().await;
    info!(stopped, "Fulfillment server stopped");
    Ok(())
}
