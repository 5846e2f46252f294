//! App longevity prediction server
//!
//! This binary serves the ensemble prediction engine over HTTP:
//! predictions, model listing, per-user history, health checks, and
//! Prometheus metrics.

use anyhow::Result;
use longevity_engine::{Engine, MemoryStore, StructuredLogger};
use longevity_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting longevity-server");

    // Load configuration
    let config = ServerConfig::load()?;
    info!(
        model_dir = %config.model_dir,
        api_port = config.api_port,
        "Server configured"
    );

    // Discover model bundles
    let mut engine = Engine::discover(config.search_paths(), config.default_model.clone());
    if let Some(seed) = config.sequence_seed {
        engine = engine.with_sequence_seed(seed);
    }
    let engine = Arc::new(engine);

    // Initialize structured logger
    let logger = StructuredLogger::new("longevity-server");
    let default_model = engine.default_model().await;
    logger.log_startup(
        SERVER_VERSION,
        engine.bundle_count().await,
        default_model.as_deref().unwrap_or("none"),
    );

    // Create shared application state
    let store = Arc::new(MemoryStore::new());
    let app_state = Arc::new(api::AppState::new(Arc::clone(&engine), store));

    // Start the API server
    let _api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
