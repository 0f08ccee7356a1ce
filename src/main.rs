//! DRAWSETTLE — settlement service for series draws.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database and serves the settlement API until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use drawsettle::api;
use drawsettle::config;
use drawsettle::engine::Settler;
use drawsettle::storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    info!(
        service = %cfg.service.name,
        database = %cfg.database.url,
        timeout_ms = cfg.settlement.collaborator_timeout_ms,
        "DRAWSETTLE starting up"
    );
    if cfg.settlement.rng_seed.is_some() {
        warn!("settlement.rng_seed is set; filler symbols are predictable");
    }

    let store = Arc::new(
        SqliteStore::connect(&cfg.database.url, cfg.database.max_connections).await?,
    );

    let settler = Settler::from_backend(store)
        .with_timeout(cfg.settlement.collaborator_timeout())
        .with_rng_seed(cfg.settlement.rng_seed);
    let state = Arc::new(settler);

    if !cfg.server.enabled {
        warn!("API server disabled in config; nothing to do");
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("Invalid server host/port")?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        result = api::serve(state, addr) => {
            if let Err(e) = result {
                error!(error = %format!("{e:#}"), "API server stopped");
                return Err(e);
            }
        }
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
        }
    }

    info!("DRAWSETTLE shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("drawsettle=info"));

    let json_logging = std::env::var("DRAWSETTLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
