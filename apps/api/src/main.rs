//! # Pharma API Server
//!
//! ## Startup
//! ```text
//! load ApiConfig ──► init tracing ──► open database (migrations)
//!      │
//!      ▼
//! spawn reservation sweeper ──► serve HTTP until Ctrl+C / SIGTERM
//!      │
//!      ▼
//! stop sweeper ──► close pool
//! ```

use std::sync::Arc;

use axum::extract::Request;
use axum::ServiceExt;
use pharma_api::{build_app, sweeper, ApiConfig, AppState, LogFormat};
use pharma_db::{Database, DbConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ApiConfig::load()?;
    init_tracing(&config);

    info!(
        address = %config.bind_address(),
        database = %config.database_path,
        "Starting Pharma API server..."
    );
    if config.uses_dev_secret() {
        warn!("PHARMA_JWT_SECRET is not set, using the development secret");
    }

    // Connect to database
    let db = Database::new(
        DbConfig::new(&config.database_path).max_connections(config.max_connections),
    )
    .await?;
    info!("Database ready");

    // Create shared state
    let state = Arc::new(AppState::new(db, config.clone()));

    // Background reservation expiry
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweeper::spawn(state.clone(), shutdown_rx);

    // Start server
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    let app = build_app(state.clone());
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background work
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }
    state.db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(config: &ApiConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
