//! CORS middleware
//!
//! Requests without an `Origin` header pass through untouched. Preflight
//! requests are answered directly with `204 No Content`; other cross-origin
//! requests contribute the response headers the HTTP adapter appends.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::{ErrorCode, ErrorOrigin, SetupError, StorageError};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use std::sync::Arc;

/// Context key of the CORS response headers
pub const CORS_CONTEXT_KEY: &str = "cors";

/// Headers to add to the final response
#[derive(Debug, Clone, Default)]
pub struct CorsHeaders(pub HeaderMap);

/// Construction options for [`cors_middleware`]
#[derive(Debug, Clone)]
pub struct CorsOptions {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub max_age_secs: u64,
    pub allow_credentials: bool,
    pub skip_paths: Option<Vec<String>>,
    pub include_paths: Option<Vec<String>>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![Method::GET, Method::POST, Method::PUT, Method::DELETE],
            allowed_headers: vec![
                "content-type".to_string(),
                "authorization".to_string(),
                "x-signature".to_string(),
                "x-timestamp".to_string(),
                "x-nonce".to_string(),
            ],
            max_age_secs: 600,
            allow_credentials: false,
            skip_paths: None,
            include_paths: None,
        }
    }
}

#[derive(Debug)]
struct CorsPolicy {
    any_origin: bool,
    origins: Vec<String>,
    methods: HeaderValue,
    headers: HeaderValue,
    max_age: HeaderValue,
    allow_credentials: bool,
}

impl CorsPolicy {
    fn new(options: &CorsOptions) -> Result<Self, SetupError> {
        let any_origin = options.allowed_origins.iter().any(|o| o == "*");
        if any_origin && options.allow_credentials {
            return Err(SetupError::Invalid(
                "CORS cannot allow credentials for any origin".to_string(),
            ));
        }

        Ok(Self {
            any_origin,
            origins: options.allowed_origins.clone(),
            methods: header_list(options.allowed_methods.iter().map(Method::as_str))?,
            headers: header_list(options.allowed_headers.iter().map(String::as_str))?,
            max_age: HeaderValue::from(options.max_age_secs),
            allow_credentials: options.allow_credentials,
        })
    }

    fn allows(&self, origin: &str) -> bool {
        self.any_origin || self.origins.iter().any(|o| o == origin)
    }

    fn response_headers(&self, origin: &HeaderValue, preflight: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.any_origin {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        } else {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(header::VARY, HeaderValue::from_static("origin"));
        }
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if preflight {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        }
        headers
    }
}

fn header_list<'a>(values: impl Iterator<Item = &'a str>) -> Result<HeaderValue, SetupError> {
    let joined = values.collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined)
        .map_err(|e| SetupError::Invalid(format!("Invalid CORS header value: {}", e)))
}

/// Build the CORS middleware
pub fn cors_middleware(options: CorsOptions) -> Result<StorageMiddleware, SetupError> {
    let policy = Arc::new(CorsPolicy::new(&options)?);
    let config = MiddlewareConfig {
        name: "cors".to_string(),
        skip_paths: options.skip_paths,
        include_paths: options.include_paths,
    };

    StorageMiddleware::new(config, move |ctx: MiddlewareContext| {
        let policy = policy.clone();
        async move {
            let Some(origin) = ctx.headers().get(header::ORIGIN).cloned() else {
                return StepResult::Ok(Step::next());
            };

            let allowed = origin.to_str().map(|o| policy.allows(o)).unwrap_or(false);
            if !allowed {
                tracing::warn!(origin = ?origin, path = %ctx.path, "CORS origin rejected");
                return StepResult::Err(
                    StorageError::new(ErrorCode::Forbidden, "Origin not allowed")
                        .with_origin(ErrorOrigin::Client)
                        .into(),
                );
            }

            let preflight = ctx.method == Method::OPTIONS
                && ctx
                    .headers()
                    .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
            let headers = policy.response_headers(&origin, preflight);

            if preflight {
                let mut response = Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(Body::empty())
                    .map_err(anyhow::Error::from)?;
                response.headers_mut().extend(headers);
                return StepResult::Ok(Step::Terminate(response));
            }

            StepResult::Ok(Step::merge(
                ContextDelta::new().insert(CORS_CONTEXT_KEY, CorsHeaders(headers)),
            ))
        }
    })
}
