// =============================================================================
// Indicator Engine: Main Entry Point
// =============================================================================
//
// Loads configuration (writing the defaults on first run), restores the
// indicator store from its snapshot if one is configured, serves the REST API
// until Ctrl+C, then cancels in-flight requests and writes the snapshot back.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod calendar;
mod engine;
mod error;
mod indicators;
mod levels;
mod market_data;
mod orchestrator;
mod runtime_config;
mod storage;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::EngineConfig;

const CONFIG_PATH: &str = "engine_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Indicator engine starting up");

    let mut config = if Path::new(CONFIG_PATH).exists() {
        EngineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            EngineConfig::default()
        })
    } else {
        // First run: write the defaults out so they can be edited.
        let defaults = EngineConfig::default();
        if let Err(e) = defaults.save(CONFIG_PATH) {
            warn!(error = %e, "Failed to write default config");
        }
        defaults
    };
    config.apply_overrides(|key| std::env::var(key).ok());

    info!(
        symbols = ?config.symbols,
        periods = ?config.periods,
        ema_periods = ?config.ema_periods,
        "Engine configuration ready"
    );

    let bind_addr = config.bind_addr.clone();
    let snapshot_path = config.snapshot_path.clone();

    // ── 2. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Restore indicator history ─────────────────────────────────────
    if let Some(path) = &snapshot_path {
        if path.exists() {
            match state.store.load_snapshot(path) {
                Ok(records) => info!(records, "Indicator history restored"),
                Err(e) => error!(error = %e, "Failed to restore indicator snapshot"),
            }
        } else {
            info!(path = %path.display(), "No indicator snapshot yet, starting empty");
        }
    }

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received, stopping gracefully");
            shutdown.cancel();
        })
        .await
        .context("API server failed")?;

    // ── 5. Persist ───────────────────────────────────────────────────────
    if let Some(path) = &snapshot_path {
        if let Err(e) = state.store.save_snapshot(path) {
            error!(error = %e, "Failed to save indicator snapshot on shutdown");
        }
    }

    info!("Indicator engine shut down complete.");
    Ok(())
}
