//! Why a signed request was rejected

use crate::error::{ErrorCode, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Closed set of verification failures, in the order checks run
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailureReason {
    #[error("signature_mismatch")]
    SignatureMismatch,
    #[error("timestamp_expired")]
    TimestampExpired,
    #[error("timestamp_invalid")]
    TimestampInvalid,
    #[error("nonce_missing")]
    NonceMissing,
    #[error("nonce_store_missing")]
    NonceStoreMissing,
    #[error("nonce_reused")]
    NonceReused,
}

impl VerificationFailureReason {
    /// Error code and message for this reason. Every reason has exactly one entry.
    pub fn definition(&self) -> (ErrorCode, &'static str) {
        match self {
            Self::SignatureMismatch => (
                ErrorCode::SignatureInvalid,
                "Request signature does not match",
            ),
            Self::TimestampExpired => (
                ErrorCode::TimestampExpired,
                "Request timestamp is outside the allowed window",
            ),
            Self::TimestampInvalid => (
                ErrorCode::TimestampInvalid,
                "Request timestamp is not a valid epoch millisecond value",
            ),
            Self::NonceMissing => (ErrorCode::NonceMissing, "Request nonce is required"),
            Self::NonceStoreMissing => (
                ErrorCode::NonceStoreMissing,
                "Nonce verification is required but no nonce store is configured",
            ),
            Self::NonceReused => (
                ErrorCode::NonceReused,
                "Request nonce has already been used",
            ),
        }
    }

    /// Wire name, as used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureMismatch => "signature_mismatch",
            Self::TimestampExpired => "timestamp_expired",
            Self::TimestampInvalid => "timestamp_invalid",
            Self::NonceMissing => "nonce_missing",
            Self::NonceStoreMissing => "nonce_store_missing",
            Self::NonceReused => "nonce_reused",
        }
    }
}

impl From<VerificationFailureReason> for StorageError {
    fn from(reason: VerificationFailureReason) -> Self {
        let (code, message) = reason.definition();
        StorageError::new(code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    const ALL: [VerificationFailureReason; 6] = [
        VerificationFailureReason::SignatureMismatch,
        VerificationFailureReason::TimestampExpired,
        VerificationFailureReason::TimestampInvalid,
        VerificationFailureReason::NonceMissing,
        VerificationFailureReason::NonceStoreMissing,
        VerificationFailureReason::NonceReused,
    ];

    #[test]
    fn test_each_reason_has_distinct_code() {
        let codes: std::collections::HashSet<_> =
            ALL.iter().map(|reason| reason.definition().0).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_display_matches_serde_name() {
        for reason in ALL {
            let serialized = serde_json::to_value(reason).unwrap();
            assert_eq!(serialized, reason.to_string());
            assert_eq!(reason.as_str(), reason.to_string());
        }
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let err: StorageError = VerificationFailureReason::TimestampExpired.into();
        assert_eq!(err.code, ErrorCode::TimestampExpired);
        assert_eq!(err.http_status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.recovery_suggestion.as_deref(),
            Some("Generate a new signature and retry quickly")
        );

        let err: StorageError = VerificationFailureReason::SignatureMismatch.into();
        assert_eq!(err.code, ErrorCode::SignatureInvalid);
    }
}
