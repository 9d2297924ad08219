//! HMAC digest selection

use crate::error::SetupError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::str::FromStr;

/// Digest used for both the body hash and the HMAC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC-SHA256, 64 hex characters
    #[default]
    Sha256,
    /// HMAC-SHA384, 96 hex characters
    Sha384,
    /// HMAC-SHA512, 128 hex characters
    Sha512,
}

impl SigningAlgorithm {
    /// Length of a hex-encoded signature produced with this algorithm
    pub fn signature_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    /// Lowercase hex digest of `data`
    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha384 => hex::encode(Sha384::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }

    /// Lowercase hex HMAC of `message` under `key`
    pub fn hex_hmac(&self, key: &[u8], message: &[u8]) -> String {
        match self {
            Self::Sha256 => {
                let mut mac =
                    Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(message);
                hex::encode(mac.finalize().into_bytes())
            }
            Self::Sha384 => {
                let mut mac =
                    Hmac::<Sha384>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(message);
                hex::encode(mac.finalize().into_bytes())
            }
            Self::Sha512 => {
                let mut mac =
                    Hmac::<Sha512>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(message);
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(SetupError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}
