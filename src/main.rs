//! Presign Gateway - signed-request verification in front of presigned URL routes
//!
//! This is the main entry point for the gateway service.
//! It sets up the Axum web server with the middleware chain and routes.

use chrono::Utc;
use presign_gateway::app::{build_chain, build_router};
use presign_gateway::config::AppConfig;
use presign_gateway::handlers::AppState;
use presign_gateway::metrics::MetricsState;
use presign_gateway::nonce::{spawn_nonce_sweeper, MemoryNonceStore, NonceStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    tracing::info!("Starting Presign Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        require_nonce = config.signing.require_nonce,
        "Configuration loaded"
    );

    // Gateway-owned nonce store, swept in the background
    let nonce_store = if config.signing.require_nonce {
        let store = Arc::new(MemoryNonceStore::with_cleanup_interval(Duration::from_secs(
            config.signing.nonce_cleanup_interval_secs,
        )));
        spawn_nonce_sweeper(
            store.clone() as Arc<dyn NonceStore>,
            Duration::from_secs(config.signing.nonce_cleanup_interval_secs),
        );
        tracing::info!("Nonce sweeper started");
        Some(store)
    } else {
        None
    };

    let chain = build_chain(
        &config,
        nonce_store.clone().map(|store| store as Arc<dyn NonceStore>),
    )?;

    let app_state = Arc::new(AppState {
        started_at: Utc::now(),
        middlewares: chain.names().into_iter().map(str::to_string).collect(),
        nonce_store,
    });
    let metrics = Arc::new(MetricsState::new());

    let app = build_router(chain, config.server.body_limit_bytes, metrics, app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    tracing::info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presign_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
