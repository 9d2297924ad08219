//! Sequential middleware execution
//!
//! Middlewares run strictly in list order; each completes before the next
//! starts. Middleware N sees the contributions of the middlewares before it
//! and nothing after. The first failure or terminal response ends the run.

use super::{Context, MiddlewareContext, MiddlewareError, Step, StorageMiddleware};
use crate::error::{StorageError, StorageResult};
use crate::request::GatewayRequest;
use axum::response::Response;
use std::sync::Arc;

/// How a chain run ended, when it did not fail
#[derive(Debug)]
pub enum ChainOutcome {
    /// Every applicable middleware continued
    Completed(Context),
    /// A middleware answered the request itself
    Responded {
        middleware: String,
        response: Response,
    },
}

impl ChainOutcome {
    /// Final context of a completed run
    pub fn context(&self) -> Option<&Context> {
        match self {
            ChainOutcome::Completed(context) => Some(context),
            ChainOutcome::Responded { .. } => None,
        }
    }
}

/// Ordered list of middlewares
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<StorageMiddleware>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<StorageMiddleware>) -> Self {
        Self { middlewares }
    }

    /// Append a middleware to the end of the chain
    pub fn with(mut self, middleware: StorageMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn push(&mut self, middleware: StorageMiddleware) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Middleware names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(StorageMiddleware::name).collect()
    }

    /// Run the chain for `request` at `path`, starting from `initial`
    pub async fn execute(
        &self,
        request: Arc<GatewayRequest>,
        path: &str,
        initial: Context,
    ) -> StorageResult<ChainOutcome> {
        execute_middleware_chain(&self.middlewares, request, path, initial).await
    }
}

/// Run `middlewares` in order for one request
pub async fn execute_middleware_chain(
    middlewares: &[StorageMiddleware],
    request: Arc<GatewayRequest>,
    path: &str,
    initial: Context,
) -> StorageResult<ChainOutcome> {
    let mut context = initial;

    for middleware in middlewares {
        let name = middleware.name();

        if !middleware.applies_to(path) {
            tracing::debug!(middleware = name, path, "Skipping middleware");
            continue;
        }

        let ctx = MiddlewareContext {
            method: request.method.clone(),
            path: path.to_string(),
            request: request.clone(),
            context: context.clone(),
        };

        match middleware.run(ctx).await {
            Ok(Step::Continue(Some(delta))) => {
                context = context.merged(delta);
            }
            Ok(Step::Continue(None)) => {}
            Ok(Step::Terminate(response)) => {
                tracing::debug!(
                    middleware = name,
                    status = %response.status(),
                    "Middleware terminated the chain"
                );
                return Ok(ChainOutcome::Responded {
                    middleware: name.to_string(),
                    response,
                });
            }
            Err(MiddlewareError::Storage(err)) => {
                tracing::debug!(middleware = name, code = %err.code, "Middleware rejected request");
                return Err(err);
            }
            Err(MiddlewareError::Unexpected(err)) => {
                tracing::error!(middleware = name, error = %format!("{:#}", err), "Middleware failed");
                return Err(StorageError::middleware_failed(name, format!("{:#}", err)));
            }
        }
    }

    Ok(ChainOutcome::Completed(context))
}
