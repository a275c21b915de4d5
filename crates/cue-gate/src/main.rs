//! # Cue Gate - Align-on-Cue Verification Engine
//!
//! Issues signed alignment and align-and-gesture challenges, scores the
//! pointer telemetry submitted with each answer, and enforces rate limits,
//! lockouts and single-use challenges.
//!
//! ## Architecture
//! ```text
//! Browser widget → Cue Gate → State store (memory | Redis)
//!                     ↓
//!                  Janitor (expiry sweeps)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod analysis;
mod captcha;
mod config;
mod janitor;
mod limits;
mod routes;
mod state;
mod store;

use config::AppConfig;
use janitor::{JanitorConfig, janitor_worker};
use state::AppState;

/// Cue Gate - Align-on-Cue verification engine
#[derive(Parser, Debug)]
#[command(name = "cue-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/cue-gate.toml")]
    config: String,

    /// Redis URL (overrides config, selects the Redis store)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// HMAC secret for challenge signatures (overrides config)
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Admin endpoint token (overrides config)
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads the environment
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("🔥 Starting Cue Gate v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let state = AppState::new(config.clone()).await?;

    // Spawn the expiry janitor
    let janitor_config = JanitorConfig {
        interval: Duration::from_secs(config.scoring.janitor_interval_secs.max(1)),
        history_idle: Duration::from_secs(config.scoring.history_idle_secs),
    };
    let janitor_shutdown = shutdown_tx.subscribe();
    tokio::spawn(janitor_worker(
        state.store.clone(),
        state.tracker.clone(),
        janitor_config,
        janitor_shutdown,
    ));

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Cue Gate listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("👋 Cue Gate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
