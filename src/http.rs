//! axum integration for the middleware chain
//!
//! [`run_chain`] is used with `axum::middleware::from_fn_with_state`. It
//! buffers the body, runs the chain and either forwards the request (with the
//! final context in its extensions) or answers it directly.

use crate::chain::{ChainOutcome, Context, MiddlewareChain};
use crate::error::StorageError;
use crate::metrics::{ChainOutcomeLabel, MetricsState};
use crate::middleware::{CorsHeaders, RequestId, CORS_CONTEXT_KEY, REQUEST_ID_CONTEXT_KEY, REQUEST_ID_HEADER};
use crate::request::GatewayRequest;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

/// Final chain context, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct ChainContext(pub Context);

/// State for [`run_chain`]
#[derive(Clone)]
pub struct GatewayLayerState {
    pub chain: Arc<MiddlewareChain>,
    /// Largest body buffered for the chain
    pub body_limit: usize,
    pub metrics: Option<Arc<MetricsState>>,
}

impl GatewayLayerState {
    pub fn new(chain: MiddlewareChain, body_limit: usize) -> Self {
        Self {
            chain: Arc::new(chain),
            body_limit,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsState>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn observe(&self, outcome: ChainOutcomeLabel, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_chain(outcome, started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    fn reject(&self, err: StorageError, started: Instant) -> Response {
        self.observe(ChainOutcomeLabel::Rejected, started);
        if let Some(metrics) = &self.metrics {
            metrics.observe_rejection(err.code.as_str());
        }
        err.into_response()
    }
}

/// Run the middleware chain in front of the routes
pub async fn run_chain(
    State(state): State<GatewayLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    // Read body for signature verification
    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return state.reject(StorageError::internal("Failed to read request body"), started);
        }
    };

    let path = parts.uri.path().to_string();
    let gateway_request = Arc::new(GatewayRequest {
        method: parts.method.clone(),
        url: parts.uri.to_string(),
        headers: parts.headers.clone(),
        body: body_bytes.clone(),
    });

    let outcome = state
        .chain
        .execute(gateway_request, &path, Context::new())
        .await;

    match outcome {
        Ok(ChainOutcome::Completed(context)) => {
            state.observe(ChainOutcomeLabel::Completed, started);

            let mut request = Request::from_parts(parts, Body::from(body_bytes));
            request.extensions_mut().insert(ChainContext(context.clone()));

            let mut response = next.run(request).await;
            decorate_response(&mut response, &context);
            response
        }
        Ok(ChainOutcome::Responded { middleware, response }) => {
            tracing::debug!(middleware = %middleware, path = %path, "Chain answered request");
            state.observe(ChainOutcomeLabel::Responded, started);
            response
        }
        Err(err) => state.reject(err, started),
    }
}

/// Append contributed CORS headers and the request id
fn decorate_response(response: &mut Response, context: &Context) {
    let headers = response.headers_mut();

    if let Some(CorsHeaders(cors)) = context.get::<CorsHeaders>(CORS_CONTEXT_KEY) {
        for (name, value) in cors {
            headers.insert(name.clone(), value.clone());
        }
    }

    if let Some(RequestId(id)) = context.get::<RequestId>(REQUEST_ID_CONTEXT_KEY) {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
    }
}
