//! Composable middleware chain
//!
//! Threads an immutable, accumulating [`Context`] through an ordered list of
//! [`StorageMiddleware`]s with per-middleware path filtering and uniform error
//! handling.

mod context;
mod engine;
mod middleware;

pub use context::{Context, ContextDelta, ContextValue, MiddlewareContext};
pub use engine::{execute_middleware_chain, ChainOutcome, MiddlewareChain};
pub use middleware::{
    MiddlewareConfig, MiddlewareError, MiddlewareHandler, Step, StepResult, StorageMiddleware,
};
