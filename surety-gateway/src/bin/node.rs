//! Flight surety node binary

use anyhow::Context;
use std::sync::Arc;
use surety_gateway::{
    Config, DeploymentRecord, Gateway, LedgerStore, NetworkAddresses, PayoutJournal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Flight Surety node");

    // Load configuration
    let config = match std::env::var("SURETY_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    // Open store
    let store = Arc::new(
        LedgerStore::open(config.store.clone())
            .await
            .context("opening ledger store")?,
    );
    let stats = store.stats()?;
    tracing::info!(
        data_dir = %config.store.data_dir.display(),
        owner = %store.owner(),
        store_id = %store.id(),
        airlines = stats.total_airlines,
        active_airlines = stats.active_airlines,
        flights = stats.total_flights,
        policies = stats.total_policies,
        "Ledger store opened"
    );

    let gateway = Gateway::new(
        config.gateway_id.clone(),
        store.clone(),
        Arc::new(PayoutJournal::new()),
        config.status_request_capacity,
    )?;

    // Owner wiring: the gateway and the status relay may call the store
    store
        .authorize_caller(store.owner(), config.gateway_id.clone())
        .await
        .context("authorizing gateway")?;
    store
        .authorize_caller(store.owner(), config.oracle_relay.clone())
        .await
        .context("authorizing status relay")?;

    let record = DeploymentRecord::new(
        config.deployment.network.clone(),
        NetworkAddresses {
            url: config.deployment.url.clone(),
            data_address: store.id().to_string(),
            app_address: gateway.id().to_string(),
        },
    );
    record.write_all(&config.deployment.output_paths)?;

    let mut requests = gateway.subscribe_status_requests();
    let listener = tokio::spawn(async move {
        loop {
            match requests.recv().await {
                Ok(request) => tracing::info!(
                    index = request.index,
                    airline = %request.airline,
                    flight = %request.flight,
                    timestamp = request.timestamp,
                    "Status request issued"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status request listener lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracing::info!(gateway = %gateway.id(), "Node ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down Flight Surety node");
    listener.abort();
    store.shutdown().await?;
    Ok(())
}
