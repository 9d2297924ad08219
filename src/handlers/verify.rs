//! Echo of the verified chain context
//!
//! Lets clients check their signing setup end to end.

use crate::http::ChainContext;
use crate::middleware::{AuthenticatedUser, RequestId, REQUEST_ID_CONTEXT_KEY, SIGNATURE_CONTEXT_KEY, USER_CONTEXT_KEY};
use crate::verification::SignatureContext;
use axum::{Extension, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthenticatedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// GET/POST /api/v1/verify
pub async fn verify_echo(Extension(ChainContext(context)): Extension<ChainContext>) -> Json<VerifyResponse> {
    let signature = context.get::<SignatureContext>(SIGNATURE_CONTEXT_KEY);

    Json(VerifyResponse {
        verified: signature.map(|s| s.verified).unwrap_or(false),
        timestamp: signature.map(|s| s.timestamp),
        nonce: signature.and_then(|s| s.nonce.clone()),
        user: context.get::<AuthenticatedUser>(USER_CONTEXT_KEY).cloned(),
        request_id: context
            .get::<RequestId>(REQUEST_ID_CONTEXT_KEY)
            .map(|id| id.0.clone()),
    })
}
