//! Gateway assembly
//!
//! Builds the middleware chain from configuration and mounts it in front of
//! the HTTP routes.

use crate::chain::MiddlewareChain;
use crate::config::{logging_options, AppConfig};
use crate::handlers::{health_check, verify_echo, AppState};
use crate::http::{run_chain, GatewayLayerState};
use crate::metrics::{metrics_router, MetricsState};
use crate::middleware::{
    auth_middleware, cors_middleware, logging_middleware, rate_limit_middleware,
    signature_verification_middleware, timeout_middleware, ApiKeyAuthenticator,
};
use crate::nonce::NonceStore;
use anyhow::Context as _;
use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Build the chain: logging, cors, rate limit, timeout, auth, signature.
///
/// Disabled concerns are left out. `nonce_store` is shared with the
/// signature middleware; without one it creates its own when nonces are
/// required.
pub fn build_chain(
    config: &AppConfig,
    nonce_store: Option<Arc<dyn NonceStore>>,
) -> anyhow::Result<MiddlewareChain> {
    let mut chain = MiddlewareChain::default();

    chain.push(logging_middleware(logging_options())?);

    if config.cors.enabled {
        chain.push(cors_middleware(config.cors.options()?)?);
    }

    if config.rate_limit.enabled {
        chain.push(rate_limit_middleware(config.rate_limit.options())?);
    }

    if config.timeout.enabled {
        chain.push(timeout_middleware(Duration::from_millis(config.timeout.timeout_ms))?);
    }

    if config.auth.enabled {
        let authenticator = ApiKeyAuthenticator::with_keys(config.auth.key_table());
        chain.push(auth_middleware(Arc::new(authenticator), config.auth.options())?);
    }

    let mut options = config
        .signing
        .verification_options()
        .context("Invalid signing configuration")?;
    options.nonce_store = nonce_store;
    chain.push(signature_verification_middleware(options)?);

    tracing::info!(middlewares = ?chain.names(), "Middleware chain built");
    Ok(chain)
}

/// Mount the routes behind `chain`
pub fn build_router(
    chain: MiddlewareChain,
    body_limit: usize,
    metrics: Arc<MetricsState>,
    app_state: Arc<AppState>,
) -> Router {
    let layer_state = GatewayLayerState::new(chain, body_limit).with_metrics(metrics.clone());

    let api_routes = Router::new().route("/verify", get(verify_echo).post(verify_echo));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(app_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .merge(metrics_router().with_state(metrics))
        .layer(axum_middleware::from_fn_with_state(layer_state, run_chain))
        .layer(TraceLayer::new_for_http())
}
