//! Error types for the presign gateway
//!
//! Every runtime failure is reported as a [`StorageError`] so route layers can
//! render a consistent HTTP response. Problems detected while wiring the
//! gateway together (bad secrets, conflicting path filters) are [`SetupError`]s
//! and surface before the first request is served.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Which side of the exchange caused a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    /// The caller sent something the gateway cannot accept
    Client,
    /// The gateway rejected or failed to process the request
    Server,
}

/// Closed set of error codes produced by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SignatureMissing,
    SignatureInvalid,
    TimestampMissing,
    TimestampInvalid,
    TimestampExpired,
    NonceMissing,
    NonceStoreMissing,
    NonceReused,
    MiddlewareFailed,
    InternalServerError,
    Unauthorized,
    Forbidden,
    RateLimitExceeded,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::TimestampMissing => "TIMESTAMP_MISSING",
            Self::TimestampInvalid => "TIMESTAMP_INVALID",
            Self::TimestampExpired => "TIMESTAMP_EXPIRED",
            Self::NonceMissing => "NONCE_MISSING",
            Self::NonceStoreMissing => "NONCE_STORE_MISSING",
            Self::NonceReused => "NONCE_REUSED",
            Self::MiddlewareFailed => "MIDDLEWARE_FAILED",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }

    /// HTTP status a failure with this code is rendered with
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::SignatureMissing
            | Self::SignatureInvalid
            | Self::TimestampMissing
            | Self::TimestampExpired
            | Self::NonceMissing
            | Self::NonceReused
            | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::TimestampInvalid => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::NonceStoreMissing | Self::MiddlewareFailed | Self::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// What the caller can do about it
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::SignatureMissing => {
                "Sign the request and send the signature in the x-signature header"
            }
            Self::SignatureInvalid => {
                "Check the shared secret, algorithm and canonical request fields, then sign again"
            }
            Self::TimestampMissing => {
                "Send the signing time in the x-timestamp header as Unix epoch milliseconds"
            }
            Self::TimestampInvalid => {
                "Send x-timestamp as a decimal string of Unix epoch milliseconds"
            }
            Self::TimestampExpired => "Generate a new signature and retry quickly",
            Self::NonceMissing => "Send a unique value in the x-nonce header",
            Self::NonceStoreMissing => "Configure a nonce store on the server",
            Self::NonceReused => "Generate a fresh nonce and sign the request again",
            Self::MiddlewareFailed | Self::InternalServerError => {
                "Retry later; contact support if the problem persists"
            }
            Self::Unauthorized => "Provide valid credentials",
            Self::Forbidden => "Use credentials with sufficient permissions",
            Self::RateLimitExceeded => "Wait before retrying",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure carried through the middleware chain
#[derive(Error, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct StorageError {
    pub origin: ErrorOrigin,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip)]
    pub http_status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_suggestion: Option<String>,
}

impl StorageError {
    /// Server-origin error with the status and suggestion mapped from `code`
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            origin: ErrorOrigin::Server,
            code,
            message: message.into(),
            details: None,
            http_status: code.http_status(),
            recovery_suggestion: Some(code.recovery_suggestion().to_string()),
        }
    }

    /// Attach structured details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the origin
    pub fn with_origin(mut self, origin: ErrorOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Infrastructure fault (unreadable body, malformed URL)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// Unexpected failure inside a named middleware
    pub fn middleware_failed(middleware: &str, cause: impl std::fmt::Display) -> Self {
        let cause = cause.to_string();
        Self::new(
            ErrorCode::MiddlewareFailed,
            format!("Middleware '{}' failed: {}", middleware, cause),
        )
        .with_details(json!({ "middleware": middleware, "cause": cause }))
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = self.http_status;

        if status.is_server_error() {
            tracing::error!(code = %self.code, status_code = %status, message = %self.message, "Request error");
        } else {
            tracing::warn!(code = %self.code, status_code = %status, message = %self.message, "Request rejected");
        }

        (status, Json(json!({ "error": self }))).into_response()
    }
}

/// Errors raised while constructing signers, stores or middlewares
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// The shared signing secret is empty
    #[error("Signing secret must not be empty")]
    EmptySecret,

    /// The requested HMAC digest is not one of SHA-256, SHA-384, SHA-512
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A middleware was given both skip and include paths
    #[error("Middleware '{middleware}' cannot set both skip_paths and include_paths")]
    ConflictingPathFilters { middleware: String },

    /// Any other invalid option
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for chain and verification code
pub type StorageResult<T> = Result<T, StorageError>;
