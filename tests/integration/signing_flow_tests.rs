//! Signing Flow Integration Tests
//!
//! Tests the signer and signature middleware end to end:
//! - Canonical string and HMAC against an independent computation
//! - Tamper detection
//! - Nonce single use, per-middleware default stores
//! - Concurrent replays

use futures_util::future::join_all;
use hmac::{Hmac, Mac};
use presign_gateway::chain::{Context, MiddlewareChain};
use presign_gateway::{
    signature_verification_middleware, ErrorCode, GatewayRequest, RequestSigner, SignInput,
    SignatureContext, SignatureVerificationOptions, SigningAlgorithm, SigningConfig,
    VerificationFailureReason, VerifyInput,
};
use axum::http::Method;
use sha2::{Digest, Sha256};
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const TS: i64 = 1_700_000_000_000;

/// Reference signature computed without the crate
fn reference_signature(secret: &str, method: &str, path: &str, ts: i64, nonce: &str, body: &str) -> String {
    let body_hash = hex::encode(Sha256::digest(body.as_bytes()));
    let canonical = format!("{}\n{}\n{}\n{}\n{}", method, path, ts, nonce, body_hash);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

// =============================================================================
// SIGNER TESTS
// =============================================================================

/// Test signature matches an independent HMAC computation
#[test]
fn test_signature_matches_reference() {
    let signer = RequestSigner::new(SigningConfig::new("s")).unwrap();
    let signed = signer.sign(
        SignInput::new("post", "/upload-url")
            .body(r#"{"a":1}"#)
            .timestamp(TS),
    );

    assert_eq!(
        signed.signature,
        reference_signature("s", "POST", "/upload-url", TS, "", r#"{"a":1}"#)
    );
    assert_eq!(signed.signature.len(), 64);
    assert_eq!(signed.headers.get("x-timestamp").unwrap(), "1700000000000");
    assert!(signed.headers.get("x-nonce").is_none());
}

/// Test nonce is part of the signed material
#[test]
fn test_nonce_signed() {
    let signer = RequestSigner::new(SigningConfig::new("s")).unwrap();
    let signed = signer.sign(SignInput::new("GET", "/download-url").nonce("n-1").timestamp(TS));

    assert_eq!(
        signed.signature,
        reference_signature("s", "GET", "/download-url", TS, "n-1", "")
    );
    assert_eq!(signed.headers.get("x-nonce").unwrap(), "n-1");
}

/// Test longer digests produce longer signatures
#[test]
fn test_sha512_signature_length() {
    let signer =
        RequestSigner::new(SigningConfig::new("s").with_algorithm(SigningAlgorithm::Sha512))
            .unwrap();
    let signed = signer.sign(SignInput::new("GET", "/x").timestamp(TS));
    assert_eq!(signed.signature.len(), 128);
}

/// Test verification one second later succeeds; tampered body fails
#[tokio::test]
async fn test_verify_and_tamper() {
    let signer = RequestSigner::new(SigningConfig::new("s")).unwrap();
    let signed = signer.sign(
        SignInput::new("POST", "/upload-url")
            .body(r#"{"a":1}"#)
            .timestamp(TS),
    );

    let mut input = VerifyInput {
        method: "POST",
        path: "/upload-url",
        body: Some(r#"{"a":1}"#),
        signature: &signed.signature,
        timestamp: TS,
        nonce: None,
    };
    assert_eq!(signer.verify_at(input, None, TS + 1000).await, Ok(()));

    input.body = Some(r#"{"a":2}"#);
    assert_eq!(
        signer.verify_at(input, None, TS + 1000).await,
        Err(VerificationFailureReason::SignatureMismatch)
    );
}

// =============================================================================
// MIDDLEWARE TESTS
// =============================================================================

fn signed_request(secret: &str, nonce: Option<&str>) -> Arc<GatewayRequest> {
    let signer = RequestSigner::new(SigningConfig::new(secret)).unwrap();
    let mut input = SignInput::new("POST", "/upload-url").body(r#"{"a":1}"#);
    input.nonce = nonce;
    let signed = signer.sign(input);
    Arc::new(
        GatewayRequest::new(Method::POST, "/upload-url")
            .with_headers(signed.headers)
            .with_body(r#"{"a":1}"#),
    )
}

fn nonce_chain(secret: &str) -> MiddlewareChain {
    let options =
        SignatureVerificationOptions::new(SigningConfig::new(secret).with_require_nonce(true));
    MiddlewareChain::new(vec![signature_verification_middleware(options).unwrap()])
}

/// Test signature context is contributed on success
#[tokio::test]
async fn test_middleware_contributes_signature_context() {
    let chain = nonce_chain("s");
    let outcome = chain
        .execute(signed_request("s", Some("n-ctx")), "/upload-url", Context::new())
        .await
        .unwrap();

    let signature = outcome
        .context()
        .unwrap()
        .get::<SignatureContext>("signature")
        .unwrap();
    assert!(signature.verified);
    assert_eq!(signature.nonce.as_deref(), Some("n-ctx"));
}

/// Test each middleware instance owns its default nonce store
#[tokio::test]
async fn test_default_stores_are_independent() {
    let first = nonce_chain("s");
    let second = nonce_chain("s");
    let request = signed_request("s", Some("shared-nonce"));

    first
        .execute(request.clone(), "/upload-url", Context::new())
        .await
        .unwrap();
    let err = first
        .execute(request.clone(), "/upload-url", Context::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NonceReused);

    second
        .execute(request, "/upload-url", Context::new())
        .await
        .unwrap();
}

/// Test a required nonce missing from the request is rejected
#[tokio::test]
async fn test_missing_required_nonce() {
    let err = nonce_chain("s")
        .execute(signed_request("s", None), "/upload-url", Context::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NonceMissing);
}

/// Test wrong secret is a signature failure, not a crash
#[tokio::test]
async fn test_wrong_secret() {
    let err = nonce_chain("s")
        .execute(signed_request("other", Some("n")), "/upload-url", Context::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SignatureInvalid);
}

/// Test concurrent replays admit exactly one request
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replay_admits_one() {
    let chain = Arc::new(nonce_chain("s"));
    let request = signed_request("s", Some("race-nonce"));

    let results = join_all((0..32).map(|_| {
        let chain = chain.clone();
        let request = request.clone();
        tokio::spawn(async move {
            chain
                .execute(request, "/upload-url", Context::new())
                .await
                .map_err(|e| e.code)
        })
    }))
    .await;

    let mut admitted = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(code) => assert_eq!(code, ErrorCode::NonceReused),
        }
    }
    assert_eq!(admitted, 1);
}
