//! Signed-request verification
//!
//! Pulls the signing headers and body out of a [`GatewayRequest`], runs the
//! signer's checks and turns a failure into either a custom response (when a
//! failure hook produces one) or the typed [`StorageError`] for the reason.
//!
//! Missing `x-signature` / `x-timestamp` headers are rejected before the
//! signer runs. Malformed URLs and unreadable bodies are infrastructure
//! faults and come back as INTERNAL_SERVER_ERROR.

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::nonce::NonceStore;
use crate::request::GatewayRequest;
use crate::signing::{
    RequestSigner, VerificationFailureReason, VerifyInput, NONCE_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Callback consulted before the default error is raised.
///
/// Returning `Some` answers the request with that response instead;
/// returning `None` declines and the typed error is raised.
pub type FailureHook =
    Arc<dyn Fn(&VerificationFailureReason, &GatewayRequest) -> Option<Response> + Send + Sync>;

/// What downstream handlers find under the `signature` context key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureContext {
    pub verified: bool,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Non-error result of verifying one request
#[derive(Debug)]
pub enum VerificationOutcome {
    Verified(SignatureContext),
    /// The failure hook answered a rejected request
    Rejected {
        reason: VerificationFailureReason,
        response: Response,
    },
}

/// Verifies inbound requests with one signer and, optionally, one nonce store
#[derive(Clone)]
pub struct SignatureVerifier {
    signer: Arc<RequestSigner>,
    nonce_store: Option<Arc<dyn NonceStore>>,
    on_failure: Option<FailureHook>,
}

impl SignatureVerifier {
    pub fn new(signer: Arc<RequestSigner>) -> Self {
        Self {
            signer,
            nonce_store: None,
            on_failure: None,
        }
    }

    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonce_store = Some(store);
        self
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    pub fn nonce_store(&self) -> Option<&Arc<dyn NonceStore>> {
        self.nonce_store.as_ref()
    }

    /// Verify `request` against the current wall clock
    pub async fn verify_request(
        &self,
        request: &GatewayRequest,
    ) -> StorageResult<VerificationOutcome> {
        self.verify_request_at(request, Utc::now().timestamp_millis())
            .await
    }

    /// Verify `request` as if the current time were `now_ms`
    pub async fn verify_request_at(
        &self,
        request: &GatewayRequest,
        now_ms: i64,
    ) -> StorageResult<VerificationOutcome> {
        let path = request.path()?;

        let signature = request.header(SIGNATURE_HEADER).ok_or_else(|| {
            StorageError::new(ErrorCode::SignatureMissing, "Missing x-signature header")
        })?;
        let timestamp_raw = request.header(TIMESTAMP_HEADER).ok_or_else(|| {
            StorageError::new(ErrorCode::TimestampMissing, "Missing x-timestamp header")
        })?;
        let nonce = request.header(NONCE_HEADER);

        let timestamp = match parse_timestamp(timestamp_raw) {
            Some(ts) => ts,
            None => {
                return self.reject(VerificationFailureReason::TimestampInvalid, request, &path);
            }
        };

        let body = request.body_text();

        let input = VerifyInput {
            method: request.method.as_str(),
            path: &path,
            body: Some(&body),
            signature,
            timestamp,
            nonce,
        };

        match self
            .signer
            .verify_at(input, self.nonce_store.as_deref(), now_ms)
            .await
        {
            Ok(()) => {
                tracing::debug!(path = %path, timestamp, "Request signature verified");
                Ok(VerificationOutcome::Verified(SignatureContext {
                    verified: true,
                    timestamp,
                    nonce: nonce.filter(|n| !n.is_empty()).map(str::to_string),
                }))
            }
            Err(reason) => self.reject(reason, request, &path),
        }
    }

    fn reject(
        &self,
        reason: VerificationFailureReason,
        request: &GatewayRequest,
        path: &str,
    ) -> StorageResult<VerificationOutcome> {
        tracing::warn!(reason = reason.as_str(), path, "Signature verification failed");

        if let Some(hook) = &self.on_failure {
            if let Some(response) = hook(&reason, request) {
                return Ok(VerificationOutcome::Rejected { reason, response });
            }
        }

        Err(StorageError::from(reason).with_details(json!({ "reason": reason })))
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("signer", &self.signer)
            .field("has_nonce_store", &self.nonce_store.is_some())
            .field("has_failure_hook", &self.on_failure.is_some())
            .finish()
    }
}

/// Decimal digits only, fitting in an i64
fn parse_timestamp(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
