//! Per-client rate limiting middleware with proxy-aware client keys
//!
//! Extracts the client address from X-Forwarded-For, Forwarded or X-Real-IP,
//! falling back to the `x-api-key` header and finally a shared anonymous key.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::{ErrorCode, ErrorOrigin, SetupError, StorageError};
use axum::http::HeaderMap;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::{NoOpMiddleware, StateInformationMiddleware},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use serde::Serialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Context key of the rate limit snapshot
pub const RATE_LIMIT_CONTEXT_KEY: &str = "rate_limit";

/// Key shared by requests that carry no identifying header
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Rate limit state after admitting a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's full burst is available again
    #[serde(serialize_with = "serialize_millis")]
    pub reset_after: Duration,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(value.as_millis() as u64)
}

/// Construction options for [`rate_limit_middleware`]
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    pub max_requests: u32,
    pub window: Duration,
    pub skip_paths: Option<Vec<String>>,
    pub include_paths: Option<Vec<String>>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            skip_paths: None,
            include_paths: None,
        }
    }
}

/// Extract the client key, preferring forwarded headers
pub fn client_key(headers: &HeaderMap) -> String {
    // X-Forwarded-For can contain multiple IPs; the first is the original client
    if let Some(header_str) = header_str(headers, "x-forwarded-for") {
        if let Some(client_ip) = header_str.split(',').next() {
            let ip = client_ip.trim();
            if looks_like_ip(ip) {
                return ip.to_string();
            }
        }
    }

    // Forwarded header (RFC 7239): "for=192.0.2.60;proto=http;by=203.0.113.43"
    if let Some(header_str) = header_str(headers, "forwarded") {
        for part in header_str.split(&[';', ','][..]) {
            if let Some(value) = part.trim().strip_prefix("for=") {
                let ip = value.trim_matches('"').trim();
                if looks_like_ip(ip) {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(ip) = header_str(headers, "x-real-ip") {
        let ip = ip.trim();
        if looks_like_ip(ip) {
            return ip.to_string();
        }
    }

    if let Some(key) = header_str(headers, "x-api-key") {
        let key = key.trim();
        if !key.is_empty() {
            return format!("key:{}", key);
        }
    }

    ANONYMOUS_KEY.to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn looks_like_ip(ip: &str) -> bool {
    !ip.is_empty() && (ip.contains('.') || ip.contains(':'))
}

/// How many checks pass between sweeps of idle client keys
const PRUNE_EVERY: u64 = 1024;

type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, StateInformationMiddleware>;

/// Per-client GCRA limiter: `max_requests` burst, fully replenished over `window`
pub struct ClientRateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
    limit: u32,
    replenish_interval: Duration,
    checks: AtomicU64,
}

impl ClientRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, SetupError> {
        Self::with_clock(max_requests, window, DefaultClock::default())
    }
}

impl<C: Clock> ClientRateLimiter<C> {
    pub fn with_clock(max_requests: u32, window: Duration, clock: C) -> Result<Self, SetupError> {
        let invalid = || {
            SetupError::Invalid("rate limit needs a non-zero request count and window".to_string())
        };
        let burst = NonZeroU32::new(max_requests).ok_or_else(invalid)?;
        let quota = Quota::with_period(window / max_requests)
            .ok_or_else(invalid)?
            .allow_burst(burst);

        let limiter = RateLimiter::<_, _, _, NoOpMiddleware<C::Instant>>::new(quota, DefaultKeyedStateStore::default(), &clock)
            .with_middleware::<StateInformationMiddleware>();

        Ok(Self {
            limiter,
            clock,
            limit: max_requests,
            replenish_interval: quota.replenish_interval(),
            checks: AtomicU64::new(0),
        })
    }

    /// Count a request for `key`; `Err` carries the wait before the next one is admitted
    pub fn check(&self, key: &str) -> Result<RateLimitInfo, Duration> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                Ok(RateLimitInfo {
                    limit: self.limit,
                    remaining,
                    reset_after: self.replenish_interval * (self.limit - remaining),
                })
            }
            Err(not_until) => Err(not_until.wait_time_from(self.clock.now())),
        }
    }

    /// Drop client keys whose quota has fully replenished
    pub fn prune(&self) {
        self.limiter.retain_recent();
        tracing::trace!(tracked = self.limiter.len(), "Pruned idle rate limit keys");
    }

    /// Number of client keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Build the rate limiting middleware
pub fn rate_limit_middleware(options: RateLimitOptions) -> Result<StorageMiddleware, SetupError> {
    let limiter = Arc::new(ClientRateLimiter::new(options.max_requests, options.window)?);
    let config = MiddlewareConfig {
        name: "rate-limit".to_string(),
        skip_paths: options.skip_paths,
        include_paths: options.include_paths,
    };

    StorageMiddleware::new(config, move |ctx: MiddlewareContext| {
        let limiter = limiter.clone();
        async move {
            let key = client_key(ctx.headers());
            match limiter.check(&key) {
                Ok(info) => StepResult::Ok(Step::merge(
                    ContextDelta::new().insert(RATE_LIMIT_CONTEXT_KEY, info),
                )),
                Err(retry_after) => {
                    tracing::warn!(client = %key, path = %ctx.path, "Rate limit exceeded");
                    StepResult::Err(
                        StorageError::new(ErrorCode::RateLimitExceeded, "Too many requests")
                            .with_origin(ErrorOrigin::Client)
                            .with_details(json!({
                                "limit": limiter.limit(),
                                "retryAfterMs": retry_after.as_millis() as u64,
                            }))
                            .into(),
                    )
                }
            }
        }
    })
}
