//! Worker server: runs one consume loop per department plus the action
//! executor, all inside a single process.

use meridian_shared::config::AppConfig;
use meridian_shared::llm::LlmClient;
use meridian_shared::messaging::{Department, MessageBroker};
use meridian_shared::vault::CredentialVault;
use meridian_worker::departments::{
    ComparativeHandler, DataRetrievalHandler, PredictiveHandler, QualitativeHandler, QuantitativeHandler,
    RecommendationHandler,
};
use meridian_worker::{ActionExecutor, DepartmentWorker};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    info!("Starting department worker server...");
    info!(version = env!("CARGO_PKG_VERSION"), "   Version");

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

    let vault = CredentialVault::new(SecretString::from(config.credential_encryption_key.clone()));
    let llm = LlmClient::new(config.llm_endpoint.clone(), SecretString::from(config.llm_api_key.clone()));
    let cache_ttl = config.cache_ttl();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    {
        let worker = DepartmentWorker::new(
            Department::DataRetrieval.queue_name(),
            DataRetrievalHandler,
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let worker = DepartmentWorker::new(
            Department::Quantitative.queue_name(),
            QuantitativeHandler { llm: llm.clone(), model: config.llm_model_tool.clone() },
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let worker = DepartmentWorker::new(
            Department::Qualitative.queue_name(),
            QualitativeHandler { llm: llm.clone(), model: config.llm_model_tool.clone() },
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let worker = DepartmentWorker::new(
            Department::Comparative.queue_name(),
            ComparativeHandler { llm: llm.clone(), model: config.llm_model_tool.clone() },
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let worker = DepartmentWorker::new(
            Department::Predictive.queue_name(),
            PredictiveHandler { llm: llm.clone(), model: config.llm_model_tool.clone() },
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let worker = DepartmentWorker::new(
            Department::Recommendation.queue_name(),
            RecommendationHandler {
                llm: llm.clone(),
                model: config.llm_model_creative.clone(),
                pool: pool.clone(),
                broker: broker.clone(),
            },
            pool.clone(),
            broker.clone(),
            vault.clone(),
            cache_ttl,
        );
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { worker.run(rx).await }));
    }

    {
        let executor = ActionExecutor::new(pool.clone(), broker.clone(), vault.clone());
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { executor.run(rx).await }));
    }

    info!("Worker server started, consuming all department queues and action.execute");
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;
    info!("Shutdown signal received, draining in-flight work...");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "worker task panicked during shutdown");
        }
    }

    info!("Worker server shutdown complete");
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
