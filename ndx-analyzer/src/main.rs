//! ndx-analyzer - Name demographics enrichment service
//!
//! Accepts lists of free-form person names, routes each through the
//! configured classification providers with fallback and pacing, and returns
//! per-name predictions plus a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use ndx_common::config::{default_config_path, ServiceConfig, CONFIG_ENV_VAR};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ndx_analyzer::AppState;

/// Command-line arguments for ndx-analyzer
#[derive(Parser, Debug)]
#[command(name = "ndx-analyzer")]
#[command(about = "Name demographics enrichment service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and NDX_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides config and NDX_BIND_ADDRESS)
    #[arg(long)]
    bind_address: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize tracing
    let default_filter = format!(
        "ndx_analyzer={level},ndx_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ndx-analyzer v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("NDX_GIT_HASH"),
        env!("NDX_BUILD_TIMESTAMP")
    );
    match args.config.or_else(default_config_path) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => warn!("Config file not found at {}, using defaults", path.display()),
        None => warn!("No config directory available, using defaults"),
    }
    info!(
        pacing_ms = config.pipeline.pacing_ms,
        provider_timeout_secs = config.pipeline.provider_timeout_secs,
        rate_limit = config.rate_limit.max_requests,
        rate_window_secs = config.rate_limit.window_secs,
        "Pipeline settings"
    );

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| {
            format!("Invalid bind address {}:{}", config.bind_address, config.port)
        })?;
    let sweep_interval = config.rate_limit.sweep_interval();

    let state = AppState::new(config).context("Failed to initialize providers")?;
    let shutdown = CancellationToken::new();

    // Periodic sweep of expired rate limit windows
    let sweep_task = {
        let rate_limiter = state.rate_limiter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        rate_limiter.sweep().await;
                    }
                }
            }
        })
    };

    let app = ndx_analyzer::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    let shutdown_state = state.clone();
    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let cancelled = shutdown_state.cancel_all_runs().await;
        if cancelled > 0 {
            info!(cancelled, "Cancelled in-flight runs");
        }
        server_shutdown.cancel();
    })
    .await
    .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = sweep_task.await {
        warn!("Rate limit sweep task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
