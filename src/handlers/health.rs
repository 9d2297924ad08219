//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Uptime in seconds
    pub uptime_seconds: i64,
    /// Crate version
    pub version: &'static str,
    /// Middlewares in execution order
    pub middlewares: Vec<String>,
    /// Entries held by the gateway-owned nonce store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_store_entries: Option<usize>,
}

/// Health status enum
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
}

/// Shared application state for health checks
pub struct AppState {
    /// Application start time
    pub started_at: chrono::DateTime<Utc>,
    /// Middleware names, captured at startup
    pub middlewares: Vec<String>,
    /// Gateway-owned nonce store, when nonces are required
    pub nonce_store: Option<Arc<crate::nonce::MemoryNonceStore>>,
}

/// Health check handler
///
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = (Utc::now() - state.started_at).num_seconds();

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION"),
        middlewares: state.middlewares.clone(),
        nonce_store_entries: state.nonce_store.as_ref().map(|store| store.len()),
    };

    (StatusCode::OK, Json(response))
}
