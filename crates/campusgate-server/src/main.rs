//! campusgate server: runs the institution lifecycle reconciler against
//! the shared SurrealDB database.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use campusgate_auth::{Reconciler, ReconcilerJob};
use campusgate_core::SystemClock;
use campusgate_db::DbManager;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campusgate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!("Starting campusgate server...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let db = match DbManager::connect(&config.db).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, url = %config.db.url, "failed to connect to database");
            return ExitCode::FAILURE;
        }
    };
    let store = match db.prepare_store().await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to run migrations");
            return ExitCode::FAILURE;
        }
    };

    let reconciler = Arc::new(Reconciler::new(store, Arc::new(SystemClock)));
    let job = ReconcilerJob::spawn(reconciler, config.access.reconcile_interval);
    tracing::info!(
        interval_secs = config.access.reconcile_interval.as_secs(),
        "reconciler scheduled"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    job.cancel().await;

    tracing::info!("campusgate server stopped.");
    ExitCode::SUCCESS
}
