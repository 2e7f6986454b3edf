//! Aegis - observability and resilience service
//!
//! Runs the monitoring engine (alerting, failure prediction, chaos
//! experiments) and serves health, metrics and read-only state over HTTP.

use aegis::{api, config::AppConfig};
use aegis_core::{collector::HostCollector, MonitoringEngine};
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting aegis");

    let config = AppConfig::load()?;
    info!(
        node_name = %config.node_name,
        instance = %config.engine.instance,
        api_port = config.api_port,
        "Service configured"
    );

    let mut engine = MonitoringEngine::new(config.engine.clone());
    if config.host_collector {
        engine = engine.with_collector(Arc::new(HostCollector::new(config.node_name.clone())));
    }
    let engine = Arc::new(engine);
    engine.start().await;

    let app_state = Arc::new(api::AppState::new(engine.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("SIGINT received");
        }
        served = api_handle => match served {
            Ok(Ok(())) => warn!("API server exited"),
            Ok(Err(e)) => error!(error = %e, "API server failed"),
            Err(e) => error!(error = %e, "API server task panicked"),
        },
    }

    engine.stop().await;
    info!("Shutdown complete");

    Ok(())
}
