//! Middleware Chain Integration Tests
//!
//! Tests a realistic chain (logging, rate limit, auth, signature):
//! - Every middleware's contribution reaches the final context
//! - Path filters let health checks through unsigned
//! - Failures short-circuit with the first middleware's error
//! - Failure hooks replace the default error

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, HeaderValue, Method, StatusCode};
use axum::response::Response;
use presign_gateway::chain::{ChainOutcome, Context, ContextDelta, MiddlewareChain, MiddlewareConfig};
use presign_gateway::middleware::{
    auth_middleware, logging_middleware, rate_limit_middleware, ApiKeyAuthenticator, AuthOptions,
    AuthenticatedUser, LoggingOptions, RateLimitInfo, RateLimitOptions, RequestId, Role,
};
use presign_gateway::{
    signature_verification_middleware, ErrorCode, FailureHook, GatewayRequest, MiddlewareContext,
    RequestSigner, SignInput, SignatureContext, SignatureVerificationOptions, SigningConfig, Step,
    StepResult, StorageMiddleware, VerificationFailureReason,
};
use std::collections::HashMap;
use std::sync::Arc;

fn gateway_chain(on_failure: Option<FailureHook>) -> MiddlewareChain {
    let authenticator = ApiKeyAuthenticator::with_keys(HashMap::from([(
        "writer-key".to_string(),
        Role::Write,
    )]));

    let mut signature =
        SignatureVerificationOptions::new(SigningConfig::new("s")).skip_paths(["/health"]);
    signature.on_failure = on_failure;

    MiddlewareChain::default()
        .with(logging_middleware(LoggingOptions::default()).unwrap())
        .with(rate_limit_middleware(RateLimitOptions::default()).unwrap())
        .with(
            auth_middleware(
                Arc::new(authenticator),
                AuthOptions {
                    required_role: Some(Role::Write),
                    skip_paths: Some(vec!["/health".to_string()]),
                    include_paths: None,
                },
            )
            .unwrap(),
        )
        .with(signature_verification_middleware(signature).unwrap())
}

fn request(path: &str, body: &str, token: Option<&str>, sign: bool) -> Arc<GatewayRequest> {
    let mut headers = if sign {
        let signer = RequestSigner::new(SigningConfig::new("s")).unwrap();
        signer.sign(SignInput::new("POST", path).body(body)).headers
    } else {
        Default::default()
    };
    if let Some(token) = token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
    }
    Arc::new(
        GatewayRequest::new(Method::POST, path)
            .with_headers(headers)
            .with_body(body.to_string()),
    )
}

/// Test every contribution is visible after a full run
#[tokio::test]
async fn test_full_chain_accumulates_context() {
    let chain = gateway_chain(None);
    assert_eq!(
        chain.names(),
        vec!["logging", "rate-limit", "auth", "signature-verification"]
    );

    let outcome = chain
        .execute(
            request("/upload-url", r#"{"a":1}"#, Some("writer-key"), true),
            "/upload-url",
            Context::new(),
        )
        .await
        .unwrap();
    let context = outcome.context().unwrap();

    assert!(context.get::<RequestId>("request_id").is_some());
    assert_eq!(context.get::<RateLimitInfo>("rate_limit").unwrap().remaining, 99);
    assert_eq!(
        context.get::<AuthenticatedUser>("user").unwrap().role,
        Role::Write
    );
    assert!(context.get::<SignatureContext>("signature").unwrap().verified);
}

/// Test skipped paths need neither credentials nor a signature
#[tokio::test]
async fn test_health_path_skips_auth_and_signature() {
    let outcome = gateway_chain(None)
        .execute(request("/health", "", None, false), "/health", Context::new())
        .await
        .unwrap();
    let context = outcome.context().unwrap();

    assert!(context.contains_key("request_id"));
    assert!(!context.contains_key("user"));
    assert!(!context.contains_key("signature"));
}

/// Test the first failing middleware decides the error
#[tokio::test]
async fn test_auth_failure_precedes_signature_failure() {
    let err = gateway_chain(None)
        .execute(request("/upload-url", "", None, false), "/upload-url", Context::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

/// Test missing signature after successful auth
#[tokio::test]
async fn test_unsigned_request_rejected() {
    let err = gateway_chain(None)
        .execute(
            request("/upload-url", "", Some("writer-key"), false),
            "/upload-url",
            Context::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SignatureMissing);
    assert_eq!(err.http_status, StatusCode::UNAUTHORIZED);
}

/// Test failure hook answers instead of raising
#[tokio::test]
async fn test_failure_hook_terminates_chain() {
    let hook: FailureHook = Arc::new(|reason: &VerificationFailureReason, request: &GatewayRequest| {
        assert_eq!(*reason, VerificationFailureReason::SignatureMismatch);
        assert_eq!(request.url, "/upload-url");
        Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .body(Body::empty())
            .ok()
    });

    let signed = request("/upload-url", "original", Some("writer-key"), true);
    let tampered = Arc::new((*signed).clone().with_body("tampered"));

    let outcome = gateway_chain(Some(hook))
        .execute(tampered, "/upload-url", Context::new())
        .await
        .unwrap();
    match outcome {
        ChainOutcome::Responded { middleware, response } => {
            assert_eq!(middleware, "signature-verification");
            assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        }
        ChainOutcome::Completed(_) => panic!("expected hook response"),
    }
}

/// Test downstream middleware can read the verified signature
#[tokio::test]
async fn test_downstream_reads_signature() {
    let audit = StorageMiddleware::new(MiddlewareConfig::new("audit"), |ctx: MiddlewareContext| async move {
        let verified = ctx
            .context
            .get::<SignatureContext>("signature")
            .map(|s| s.verified)
            .unwrap_or(false);
        StepResult::Ok(Step::merge(ContextDelta::new().insert("audited", verified)))
    })
    .unwrap();
    let chain = gateway_chain(None).with(audit);

    let outcome = chain
        .execute(
            request("/upload-url", "", Some("writer-key"), true),
            "/upload-url",
            Context::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.context().unwrap().get::<bool>("audited"), Some(&true));
}
