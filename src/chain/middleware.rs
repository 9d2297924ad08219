//! Middleware contract
//!
//! A middleware is a named handler plus optional path filters. Each run yields
//! a [`Step`]: continue (optionally contributing a [`ContextDelta`]) or
//! terminate the request with a ready response. Failures are either typed
//! [`StorageError`]s, which propagate unchanged, or unexpected errors, which
//! the engine wraps with the middleware's name.

use super::{ContextDelta, MiddlewareContext};
use crate::error::{SetupError, StorageError};
use async_trait::async_trait;
use axum::response::Response;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Result of one middleware run
#[derive(Debug)]
pub enum Step {
    /// Keep going; merge the delta if there is one
    Continue(Option<ContextDelta>),
    /// Stop the chain and send this response
    Terminate(Response),
}

impl Step {
    /// Continue without contributing
    pub fn next() -> Self {
        Step::Continue(None)
    }

    /// Continue and merge `delta`
    pub fn merge(delta: ContextDelta) -> Self {
        Step::Continue(Some(delta))
    }
}

/// Failure raised by a middleware
#[derive(Error, Debug)]
pub enum MiddlewareError {
    /// Already typed; re-raised as-is
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Anything else; wrapped as MIDDLEWARE_FAILED
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StepResult = Result<Step, MiddlewareError>;

/// Handler half of a middleware
#[async_trait]
pub trait MiddlewareHandler: Send + Sync {
    async fn handle(&self, ctx: MiddlewareContext) -> StepResult;
}

#[async_trait]
impl<F, Fut> MiddlewareHandler for F
where
    F: Fn(MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    async fn handle(&self, ctx: MiddlewareContext) -> StepResult {
        (self)(ctx).await
    }
}

/// Name and path filters of a middleware
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddlewareConfig {
    pub name: String,
    /// Paths the middleware does not run on
    pub skip_paths: Option<Vec<String>>,
    /// Only paths the middleware runs on
    pub include_paths: Option<Vec<String>>,
}

impl MiddlewareConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Skip and include filters are mutually exclusive
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.skip_paths.is_some() && self.include_paths.is_some() {
            return Err(SetupError::ConflictingPathFilters {
                middleware: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Whether the middleware runs for `path`
    pub fn applies_to(&self, path: &str) -> bool {
        if let Some(include) = &self.include_paths {
            return include.iter().any(|p| p == path);
        }
        if let Some(skip) = &self.skip_paths {
            return !skip.iter().any(|p| p == path);
        }
        true
    }
}

/// A validated middleware ready to be placed in a chain
#[derive(Clone)]
pub struct StorageMiddleware {
    config: MiddlewareConfig,
    handler: Arc<dyn MiddlewareHandler>,
}

impl StorageMiddleware {
    /// Build a middleware, rejecting conflicting path filters
    pub fn new<H>(config: MiddlewareConfig, handler: H) -> Result<Self, SetupError>
    where
        H: MiddlewareHandler + 'static,
    {
        Self::from_handler(config, Arc::new(handler))
    }

    pub fn from_handler(
        config: MiddlewareConfig,
        handler: Arc<dyn MiddlewareHandler>,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self { config, handler })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.config.applies_to(path)
    }

    pub(crate) async fn run(&self, ctx: MiddlewareContext) -> StepResult {
        self.handler.handle(ctx).await
    }
}

impl std::fmt::Debug for StorageMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageMiddleware")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
