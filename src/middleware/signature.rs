//! Signature-verification middleware
//!
//! Wraps a [`SignatureVerifier`] as a chain middleware. On success it
//! contributes [`SignatureContext`] under the `signature` key; on failure it
//! either answers with the failure hook's response or raises the typed error.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::SetupError;
use crate::nonce::{MemoryNonceStore, NonceStore};
use crate::signing::{RequestSigner, SigningConfig};
use crate::verification::{FailureHook, SignatureVerifier, VerificationOutcome};
use std::sync::Arc;

/// Context key of the verification result
pub const SIGNATURE_CONTEXT_KEY: &str = "signature";

/// Middleware name used in logs and error details
pub const SIGNATURE_MIDDLEWARE_NAME: &str = "signature-verification";

/// Construction options for [`signature_verification_middleware`]
pub struct SignatureVerificationOptions {
    pub signing: SigningConfig,
    /// Replay cache; when nonces are required and none is given, the
    /// middleware creates a private [`MemoryNonceStore`]
    pub nonce_store: Option<Arc<dyn NonceStore>>,
    pub on_failure: Option<FailureHook>,
    pub skip_paths: Option<Vec<String>>,
    pub include_paths: Option<Vec<String>>,
}

impl SignatureVerificationOptions {
    pub fn new(signing: SigningConfig) -> Self {
        Self {
            signing,
            nonce_store: None,
            on_failure: None,
            skip_paths: None,
            include_paths: None,
        }
    }

    pub fn nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonce_store = Some(store);
        self
    }

    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }
}

/// Build the signature-verification middleware.
///
/// The signer and, when needed, the default nonce store are created once
/// here and shared by every request the middleware handles.
pub fn signature_verification_middleware(
    options: SignatureVerificationOptions,
) -> Result<StorageMiddleware, SetupError> {
    let verifier = build_verifier(options.signing, options.nonce_store, options.on_failure)?;

    let config = MiddlewareConfig {
        name: SIGNATURE_MIDDLEWARE_NAME.to_string(),
        skip_paths: options.skip_paths,
        include_paths: options.include_paths,
    };

    let verifier = Arc::new(verifier);
    StorageMiddleware::new(config, move |ctx: MiddlewareContext| {
        let verifier = verifier.clone();
        async move {
            match verifier.verify_request(&ctx.request).await? {
                VerificationOutcome::Verified(signature) => StepResult::Ok(Step::merge(
                    ContextDelta::new().insert(SIGNATURE_CONTEXT_KEY, signature),
                )),
                VerificationOutcome::Rejected { response, .. } => {
                    StepResult::Ok(Step::Terminate(response))
                }
            }
        }
    })
}

fn build_verifier(
    signing: SigningConfig,
    nonce_store: Option<Arc<dyn NonceStore>>,
    on_failure: Option<FailureHook>,
) -> Result<SignatureVerifier, SetupError> {
    let require_nonce = signing.require_nonce;
    let signer = Arc::new(RequestSigner::new(signing)?);
    let mut verifier = SignatureVerifier::new(signer);

    let store = match nonce_store {
        Some(store) => Some(store),
        None if require_nonce => {
            tracing::debug!("No nonce store configured; using a private in-memory store");
            Some(Arc::new(MemoryNonceStore::new()) as Arc<dyn NonceStore>)
        }
        None => None,
    };
    if let Some(store) = store {
        verifier = verifier.with_nonce_store(store);
    }
    if let Some(hook) = on_failure {
        verifier = verifier.with_failure_hook(hook);
    }

    Ok(verifier)
}
