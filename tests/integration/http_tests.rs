//! HTTP Integration Tests
//!
//! Drives the assembled router through `tower::ServiceExt::oneshot`:
//! - Error bodies and status codes
//! - Verified context reaching handlers
//! - CORS preflight and response headers
//! - Metrics after traffic

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use presign_gateway::app::build_router;
use presign_gateway::chain::MiddlewareChain;
use presign_gateway::handlers::AppState;
use presign_gateway::metrics::MetricsState;
use presign_gateway::middleware::{cors_middleware, logging_middleware, CorsOptions, LoggingOptions};
use presign_gateway::{
    signature_verification_middleware, RequestSigner, SignInput, SignatureVerificationOptions,
    SigningConfig,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "http-test-secret";
const VERIFY_PATH: &str = "/api/v1/verify";

fn app() -> Router {
    let chain = MiddlewareChain::default()
        .with(
            logging_middleware(LoggingOptions {
                trust_inbound_id: true,
                skip_paths: None,
            })
            .unwrap(),
        )
        .with(
            cors_middleware(CorsOptions {
                allowed_origins: vec!["https://app.example.com".to_string()],
                ..Default::default()
            })
            .unwrap(),
        )
        .with(
            signature_verification_middleware(
                SignatureVerificationOptions::new(SigningConfig::new(SECRET))
                    .skip_paths(["/health", "/metrics"]),
            )
            .unwrap(),
        );

    let app_state = Arc::new(AppState {
        started_at: Utc::now(),
        middlewares: chain.names().into_iter().map(str::to_string).collect(),
        nonce_store: None,
    });

    build_router(chain, 1024 * 1024, Arc::new(MetricsState::new()), app_state)
}

fn signed_post(path: &str, body: &str) -> Request<Body> {
    let signer = RequestSigner::new(SigningConfig::new(SECRET)).unwrap();
    let signed = signer.sign(SignInput::new("POST", path).body(body).nonce("n-http"));

    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json");
    for (name, value) in signed.headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Test unsigned request gets the structured error body
#[tokio::test]
async fn test_unsigned_request_returns_401() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(VERIFY_PATH)
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "SIGNATURE_MISSING");
    assert_eq!(json["error"]["origin"], "server");
    assert!(json["error"]["recoverySuggestion"].is_string());
}

/// Test signed request reaches the handler with the verified context
#[tokio::test]
async fn test_signed_request_is_verified() {
    let response = app()
        .oneshot(signed_post(VERIFY_PATH, r#"{"key":"photos/cat.png"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let json = json_body(response).await;
    assert_eq!(json["verified"], true);
    assert_eq!(json["nonce"], "n-http");
    assert!(json["requestId"].is_string());
}

/// Test query strings are not part of the signed path
#[tokio::test]
async fn test_query_string_ignored() {
    let mut request = signed_post(VERIFY_PATH, "");
    *request.uri_mut() = format!("{}?bucket=images", VERIFY_PATH).parse().unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test tampered body is rejected with 401
#[tokio::test]
async fn test_tampered_body_rejected() {
    let mut request = signed_post(VERIFY_PATH, r#"{"size":1}"#);
    *request.body_mut() = Body::from(r#"{"size":1000000}"#);

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "SIGNATURE_INVALID");
    assert_eq!(json["error"]["details"]["reason"], "signature_mismatch");
}

/// Test malformed timestamp is a 400
#[tokio::test]
async fn test_malformed_timestamp_returns_400() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(VERIFY_PATH)
                .header("x-signature", "deadbeef")
                .header("x-timestamp", "yesterday")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "TIMESTAMP_INVALID");
}

/// Test health endpoint skips signature verification
#[tokio::test]
async fn test_health_unsigned() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["middlewares"][2], "signature-verification");
}

/// Test inbound request id is echoed back
#[tokio::test]
async fn test_request_id_echoed() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-123");
}

/// Test CORS preflight is answered by the chain
#[tokio::test]
async fn test_cors_preflight() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri(VERIFY_PATH)
                .header("Origin", "https://app.example.com")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );
}

/// Test CORS headers are added to routed responses
#[tokio::test]
async fn test_cors_headers_on_response() {
    let mut request = signed_post(VERIFY_PATH, "");
    request
        .headers_mut()
        .insert("origin", "https://app.example.com".parse().unwrap());

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );
}

/// Test disallowed origin is forbidden
#[tokio::test]
async fn test_cors_disallowed_origin() {
    let mut request = signed_post(VERIFY_PATH, "");
    request
        .headers_mut()
        .insert("origin", "https://evil.example.com".parse().unwrap());

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Test metrics reflect chain traffic
#[tokio::test]
async fn test_metrics_after_rejection() {
    let app = app();

    let rejected = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(VERIFY_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"gateway_chain_rejections_total{code="SIGNATURE_MISSING"} 1"#));
}

/// Test oversized bodies are counted as rejections
#[tokio::test]
async fn test_oversized_body_recorded_in_metrics() {
    let app = app();

    let oversized = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(VERIFY_PATH)
                .body(Body::from(vec![b'x'; 2 * 1024 * 1024]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(oversized).await;
    assert_eq!(json["error"]["code"], "INTERNAL_SERVER_ERROR");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"gateway_chain_rejections_total{code="INTERNAL_SERVER_ERROR"} 1"#));
}
