//! Presign Gateway Library
//!
//! HMAC request signing and verification with replay protection, plus a
//! composable middleware chain for gateways that hand out presigned storage
//! URLs.

pub mod app;
pub mod chain;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod nonce;
pub mod request;
pub mod signing;
pub mod verification;

// Re-export commonly used types for tests
pub use chain::{
    execute_middleware_chain, ChainOutcome, Context, ContextDelta, MiddlewareChain,
    MiddlewareConfig, MiddlewareContext, MiddlewareError, Step, StepResult, StorageMiddleware,
};
pub use config::AppConfig;
pub use error::{ErrorCode, ErrorOrigin, SetupError, StorageError, StorageResult};
pub use middleware::{signature_verification_middleware, SignatureVerificationOptions};
pub use nonce::{MemoryNonceStore, NonceStore};
pub use request::GatewayRequest;
pub use signing::{
    RequestSigner, SignInput, SignedRequest, SigningAlgorithm, SigningConfig,
    VerificationFailureReason, VerifyInput,
};
pub use verification::{FailureHook, SignatureContext, SignatureVerifier, VerificationOutcome};
