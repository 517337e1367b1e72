//! CryptoSheets - crypto market data exports
//!
//! An HTTP service that exports crypto market data as JSON, CSV, XLSX or
//! Excel Web Query files, with Power Query templates for live workbooks.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod excel;
pub mod export;
pub mod identity;
pub mod providers;
pub mod ratelimit;
pub mod scheduler;
pub mod security;
pub mod server;
pub mod state;

use config::ServerConfig;
use scheduler::MaintenanceScheduler;
use server::ApiServer;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging, start the API server and the maintenance scheduler,
/// and run until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cryptosheets=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CryptoSheets...");

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::new(config)?);
    tracing::info!("Application state initialized");

    let maintenance = MaintenanceScheduler::new(state.clone()).start();

    let mut server = ApiServer::new(state);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    server.stop();
    maintenance.abort();
    Ok(())
}
