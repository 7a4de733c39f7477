pub mod adherence;
pub mod api;
pub mod config;
pub mod core_state;
pub mod coverage;
pub mod db;
pub mod directory;
pub mod models;
pub mod patients;
pub mod prescriptions;
pub mod schedule;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error("API server failed to start: {0}")]
    Server(String),
    #[error("Cannot listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Run the engine until Ctrl-C: sweep scheduler plus HTTP API.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let engine_config = config::EngineConfig::load()?;
    let core = Arc::new(core_state::CoreState::new(engine_config)?);
    tracing::info!(db = %core.db_path().display(), "Database ready");

    let sweep = schedule::start_sweep_scheduler(core.clone());

    let server = api::start_api_server(core.clone())
        .await
        .map_err(StartupError::Server)?;
    tracing::info!(addr = %server.addr, "Listening");
    *core.api_server.lock().await = Some(server);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    if let Some(mut server) = core.api_server.lock().await.take() {
        server.shutdown();
    }
    // Joins the sweep thread; a pass in progress finishes first.
    if let Err(e) = tokio::task::spawn_blocking(move || drop(sweep)).await {
        tracing::warn!("Sweep scheduler did not stop cleanly: {e}");
    }

    if let Err(e) = core.flush_and_prune_audit() {
        tracing::warn!("Final audit flush failed: {e}");
    }
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
