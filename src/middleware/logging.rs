//! Request logging middleware
//!
//! Assigns each request an id (the inbound `x-request-id` when present) and
//! logs it.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::SetupError;
use uuid::Uuid;

/// Context key of the request id
pub const REQUEST_ID_CONTEXT_KEY: &str = "request_id";

/// Header carrying the request id in and out
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id contributed to the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Reuse an inbound `x-request-id` instead of generating one
    pub trust_inbound_id: bool,
    pub skip_paths: Option<Vec<String>>,
}

pub fn logging_middleware(options: LoggingOptions) -> Result<StorageMiddleware, SetupError> {
    let config = MiddlewareConfig {
        name: "logging".to_string(),
        skip_paths: options.skip_paths,
        include_paths: None,
    };
    let trust_inbound_id = options.trust_inbound_id;

    StorageMiddleware::new(config, move |ctx: MiddlewareContext| async move {
        let inbound = trust_inbound_id
            .then(|| ctx.request.header(REQUEST_ID_HEADER))
            .flatten()
            .filter(|id| !id.is_empty() && id.len() <= 128);
        let request_id = match inbound {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        tracing::info!(
            request_id = %request_id,
            method = %ctx.method,
            path = %ctx.path,
            "Request received"
        );

        StepResult::Ok(Step::merge(
            ContextDelta::new().insert(REQUEST_ID_CONTEXT_KEY, RequestId(request_id)),
        ))
    })
}
