//! Canonical request signer
//!
//! Signs and verifies requests with an HMAC over the canonical string
//!
//! ```text
//! METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY_HASH
//! ```
//!
//! where METHOD is uppercased, NONCE is empty when absent and BODY_HASH is the
//! lowercase hex digest of the body (empty body when absent) under the
//! configured algorithm.
//!
//! Verification checks, first failure wins:
//! 1. Timestamp is a valid epoch millisecond value
//! 2. Timestamp within tolerance of now, in either direction
//! 3. Nonce present and a store configured, when nonces are required
//! 4. Nonce not seen before (whenever a nonce and a store are both present)
//! 5. Signature matches, compared in constant time

use super::{SigningAlgorithm, VerificationFailureReason};
use crate::error::SetupError;
use crate::nonce::NonceStore;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "x-signature";
/// Header carrying the signing time in epoch milliseconds
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
/// Header carrying the optional nonce
pub const NONCE_HEADER: &str = "x-nonce";

/// Default accepted clock difference between signer and verifier
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(5 * 60);
/// Default lifetime of a recorded nonce
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(10 * 60);

/// Immutable signing configuration
#[derive(Debug)]
pub struct SigningConfig {
    secret: SecretString,
    /// Digest for body hash and HMAC
    pub algorithm: SigningAlgorithm,
    /// Maximum distance between request timestamp and now
    pub timestamp_tolerance: Duration,
    /// Reject requests without a nonce
    pub require_nonce: bool,
    /// How long an admitted nonce blocks reuse; should be >= `timestamp_tolerance`
    pub nonce_ttl: Duration,
}

impl SigningConfig {
    /// Configuration with default algorithm, tolerance and nonce settings
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            algorithm: SigningAlgorithm::default(),
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            require_nonce: false,
            nonce_ttl: DEFAULT_NONCE_TTL,
        }
    }

    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }

    pub fn with_require_nonce(mut self, require: bool) -> Self {
        self.require_nonce = require;
        self
    }

    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }
}

/// Fields to sign
#[derive(Debug, Clone, Copy, Default)]
pub struct SignInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: Option<&'a str>,
    pub nonce: Option<&'a str>,
    /// Epoch milliseconds; now when absent
    pub timestamp: Option<i64>,
}

impl<'a> SignInput<'a> {
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            ..Default::default()
        }
    }

    pub fn body(mut self, body: &'a str) -> Self {
        self.body = Some(body);
        self
    }

    pub fn nonce(mut self, nonce: &'a str) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Output of [`RequestSigner::sign`]
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub signature: String,
    pub timestamp: i64,
    pub nonce: Option<String>,
    /// `x-signature`, `x-timestamp` and, when a nonce was signed, `x-nonce`
    pub headers: HeaderMap,
}

/// Fields received with a signed request
#[derive(Debug, Clone, Copy)]
pub struct VerifyInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: Option<&'a str>,
    pub signature: &'a str,
    pub timestamp: i64,
    pub nonce: Option<&'a str>,
}

/// Build the canonical string that gets signed
pub fn canonical_string(
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: Option<&str>,
    body_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        path,
        timestamp,
        nonce.unwrap_or(""),
        body_hash
    )
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Length is not secret and may short-circuit; content never does.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Signs and verifies requests under one shared secret
#[derive(Debug)]
pub struct RequestSigner {
    config: SigningConfig,
}

impl RequestSigner {
    /// Validate `config` and build a signer
    pub fn new(config: SigningConfig) -> Result<Self, SetupError> {
        if config.secret.expose_secret().is_empty() {
            return Err(SetupError::EmptySecret);
        }

        if config.nonce_ttl < config.timestamp_tolerance {
            tracing::warn!(
                nonce_ttl_ms = config.nonce_ttl.as_millis() as u64,
                tolerance_ms = config.timestamp_tolerance.as_millis() as u64,
                "Nonce TTL is shorter than the timestamp tolerance; replays may pass after the nonce expires"
            );
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Compute the signature for `input` and the headers that carry it
    pub fn sign(&self, input: SignInput<'_>) -> SignedRequest {
        let timestamp = input
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let nonce = non_empty(input.nonce);
        let signature = self.compute(input.method, input.path, input.body, nonce, timestamp);

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&signature) {
            headers.insert(HeaderName::from_static(SIGNATURE_HEADER), value);
        }
        headers.insert(
            HeaderName::from_static(TIMESTAMP_HEADER),
            HeaderValue::from(timestamp),
        );
        if let Some(nonce) = nonce {
            match HeaderValue::from_str(nonce) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(NONCE_HEADER), value);
                }
                Err(_) => {
                    tracing::warn!("Nonce contains characters not allowed in a header value");
                }
            }
        }

        SignedRequest {
            signature,
            timestamp,
            nonce: nonce.map(str::to_string),
            headers,
        }
    }

    /// Verify `input` against the current wall clock
    pub async fn verify(
        &self,
        input: VerifyInput<'_>,
        nonce_store: Option<&dyn NonceStore>,
    ) -> Result<(), VerificationFailureReason> {
        self.verify_at(input, nonce_store, Utc::now().timestamp_millis())
            .await
    }

    /// Verify `input` as if the current time were `now_ms`
    pub async fn verify_at(
        &self,
        input: VerifyInput<'_>,
        nonce_store: Option<&dyn NonceStore>,
        now_ms: i64,
    ) -> Result<(), VerificationFailureReason> {
        if input.timestamp < 0 {
            return Err(VerificationFailureReason::TimestampInvalid);
        }

        let tolerance_ms = i64::try_from(self.config.timestamp_tolerance.as_millis())
            .unwrap_or(i64::MAX);
        let drift = now_ms.saturating_sub(input.timestamp).saturating_abs();
        if drift > tolerance_ms {
            return Err(VerificationFailureReason::TimestampExpired);
        }

        let nonce = non_empty(input.nonce);
        if self.config.require_nonce {
            if nonce.is_none() {
                return Err(VerificationFailureReason::NonceMissing);
            }
            if nonce_store.is_none() {
                return Err(VerificationFailureReason::NonceStoreMissing);
            }
        }

        if let (Some(nonce), Some(store)) = (nonce, nonce_store) {
            if !store.add_if_not_exists(nonce, self.config.nonce_ttl).await {
                return Err(VerificationFailureReason::NonceReused);
            }
        }

        let expected = self.compute(input.method, input.path, input.body, nonce, input.timestamp);
        if !constant_time_compare(input.signature, &expected) {
            return Err(VerificationFailureReason::SignatureMismatch);
        }

        Ok(())
    }

    fn compute(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
        nonce: Option<&str>,
        timestamp: i64,
    ) -> String {
        let algorithm = self.config.algorithm;
        let body_hash = algorithm.hex_digest(body.unwrap_or("").as_bytes());
        let canonical = canonical_string(method, path, timestamp, nonce, &body_hash);
        algorithm.hex_hmac(
            self.config.secret.expose_secret().as_bytes(),
            canonical.as_bytes(),
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
