//! Orchestrator server: consumes the `ingest` queue and drives each analysis
//! request's planning graph to completion.

use meridian_orchestrator::Driver;
use meridian_shared::config::AppConfig;
use meridian_shared::llm::LlmClient;
use meridian_shared::messaging::MessageBroker;
use meridian_shared::update_bus::InProcessUpdateBus;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    info!("Starting orchestrator server...");
    info!(version = env!("CARGO_PKG_VERSION"), "   Version");
    info!(
        mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "   Build mode"
    );

    let config = AppConfig::load().map_err(|e| format!("failed to load configuration: {e}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| format!("failed to connect to database: {e}"))?;

    let pgmq_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.broker_url())
        .await
        .map_err(|e| format!("failed to connect to broker database: {e}"))?;
    let pgmq_client = meridian_pgmq::PgmqClient::new_with_pool(pgmq_pool).await;
    let broker = MessageBroker::new(pgmq_client);
    broker.ensure_topology().await.map_err(|e| format!("failed to declare queue topology: {e}"))?;

    let update_bus = InProcessUpdateBus::new();
    let llm = LlmClient::new(config.llm_endpoint.clone(), SecretString::from(config.llm_api_key.clone()));

    let driver = Driver::new(
        pool,
        broker,
        update_bus,
        llm,
        config.llm_model_planner.clone(),
        config.llm_model_aggregator.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let driver_handle = tokio::spawn(async move { driver.run(shutdown_rx).await });

    info!("Orchestrator server started, consuming the ingest queue");
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;
    info!("Shutdown signal received, draining in-flight work...");

    let _ = shutdown_tx.send(true);
    if let Err(err) = driver_handle.await {
        error!(%err, "driver task panicked during shutdown");
    }

    info!("Orchestrator server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C"); },
        _ = terminate => { info!("Received SIGTERM"); },
    }
}
