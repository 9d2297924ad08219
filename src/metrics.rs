//! Prometheus metrics for the presign gateway
//!
//! Exposes metrics endpoint for monitoring:
//! - Chain outcomes counter
//! - Rejections by error code
//! - Chain latency histogram

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// How a chain run ended, as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcomeLabel {
    Completed,
    Responded,
    Rejected,
}

impl ChainOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Responded => "responded",
            Self::Rejected => "rejected",
        }
    }
}

/// Metrics state
pub struct MetricsState {
    /// Prometheus registry
    registry: Registry,
    /// Chain runs by outcome
    pub chain_requests: IntCounterVec,
    /// Rejected requests by error code
    pub chain_rejections: IntCounterVec,
    /// Chain latency histogram (in milliseconds)
    pub chain_duration: Histogram,
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Self {
        let registry = Registry::new();

        let chain_requests = IntCounterVec::new(
            Opts::new(
                "gateway_chain_requests_total",
                "Requests that went through the middleware chain",
            ),
            &["outcome"],
        )
        .expect("Failed to create chain_requests counter");
        registry
            .register(Box::new(chain_requests.clone()))
            .expect("Failed to register chain_requests");

        let chain_rejections = IntCounterVec::new(
            Opts::new(
                "gateway_chain_rejections_total",
                "Requests rejected by the middleware chain",
            ),
            &["code"],
        )
        .expect("Failed to create chain_rejections counter");
        registry
            .register(Box::new(chain_rejections.clone()))
            .expect("Failed to register chain_rejections");

        let chain_duration = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_chain_duration_ms",
                "Middleware chain latency in milliseconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        )
        .expect("Failed to create chain_duration histogram");
        registry
            .register(Box::new(chain_duration.clone()))
            .expect("Failed to register chain_duration");

        Self {
            registry,
            chain_requests,
            chain_rejections,
            chain_duration,
        }
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one chain run
    pub fn observe_chain(&self, outcome: ChainOutcomeLabel, elapsed_ms: f64) {
        self.chain_requests
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.chain_duration.observe(elapsed_ms);
    }

    pub fn observe_rejection(&self, code: &str) {
        self.chain_rejections.with_label_values(&[code]).inc();
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics handler - returns Prometheus metrics in text format
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

/// Create metrics router
pub fn metrics_router() -> Router<Arc<MetricsState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
