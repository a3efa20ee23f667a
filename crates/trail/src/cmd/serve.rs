//! Serve command - Run the Trail server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use trail_api::{AppState, build_router};
use trail_config::Config;
use trail_follow::{DataProvider, Subscriptions};

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file (defaults to configs/config.toml if not specified)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config_path = args
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default)".to_string());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        config = %config_path,
        "Trail starting"
    );

    let config = load_config(args.config)?;

    if let Err(e) = run_server(config).await {
        error!(error = %e, "server error");
        return Err(e);
    }

    info!("Trail shutdown complete");
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        // User explicitly provided config path - must exist
        if !path.exists() {
            return Err(anyhow::anyhow!("config file not found: {}", path.display()));
        }
        return Config::from_file(&path).context("failed to load configuration");
    }

    // No config provided - try default paths, fall back to defaults
    let default_paths = [
        PathBuf::from("configs/config.toml"),
        PathBuf::from("config.toml"),
    ];
    for path in &default_paths {
        if path.exists() {
            info!(config = %path.display(), "using config file");
            return Config::from_file(path).context("failed to load configuration");
        }
    }

    info!("no config file found, using defaults (in-memory source on port 8080)");
    Ok(Config::default())
}

/// Main server run loop
async fn run_server(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    let source = trail_source::open(&config.source)
        .await
        .context("failed to open source")?;
    info!(source = source.name(), "source opened");

    let subscriptions = Subscriptions::new(config.follow.poll_threads);
    let provider = Arc::new(DataProvider::from_config(
        source.clone(),
        subscriptions.clone(),
        &config.follow,
    ));
    let state = AppState::new(provider, &config.follow);

    let app = build_router(state).layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        addr = %addr,
        poll_threads = subscriptions.poll_threads(),
        "Trail listening"
    );

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_cancel.cancelled().await;
            })
            .await
    });

    wait_for_shutdown().await;
    info!("shutdown signal received");

    // Stop tailing first so follow streams end and the server can drain
    subscriptions.shutdown();
    cancel.cancel();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    if let Err(e) = source.close().await {
        warn!(error = %e, "failed to close source");
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
