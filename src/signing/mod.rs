//! HMAC request signing
//!
//! Shared-secret signatures over a canonical form of the request, with
//! timestamp freshness and optional nonce replay protection.

mod algorithm;
mod reason;
mod signer;

pub use algorithm::SigningAlgorithm;
pub use reason::VerificationFailureReason;
pub use signer::*;
