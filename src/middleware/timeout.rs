//! Request deadline middleware
//!
//! Contributes a [`TimeoutSignal`] that downstream handlers can select on.
//! The chain itself never enforces the deadline.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::SetupError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Context key of the timeout signal
pub const TIMEOUT_CONTEXT_KEY: &str = "timeout";

/// Cancelled once the request deadline passes
///
/// The deadline timer stops when the last clone of the signal is dropped,
/// so a finished request leaves nothing running.
#[derive(Debug, Clone)]
pub struct TimeoutSignal {
    pub token: CancellationToken,
    pub deadline: Instant,
    _release: Arc<DropGuard>,
}

impl TimeoutSignal {
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Build the timeout middleware
pub fn timeout_middleware(timeout: Duration) -> Result<StorageMiddleware, SetupError> {
    if timeout.is_zero() {
        return Err(SetupError::Invalid("timeout must be non-zero".to_string()));
    }

    StorageMiddleware::new(MiddlewareConfig::new("timeout"), move |_ctx: MiddlewareContext| async move {
        let token = CancellationToken::new();
        let released = CancellationToken::new();
        let deadline = Instant::now() + timeout;

        let expired = token.clone();
        let done = released.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = done.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => expired.cancel(),
            }
        });

        let signal = TimeoutSignal {
            token,
            deadline,
            _release: Arc::new(released.drop_guard()),
        };
        StepResult::Ok(Step::merge(
            ContextDelta::new().insert(TIMEOUT_CONTEXT_KEY, signal),
        ))
    })
}
