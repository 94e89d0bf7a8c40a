//! GRC Integrity Engine
//!
//! Seals records with HMAC-SHA256 over a canonical byte encoding, and
//! encrypts sensitive payloads with AES-256-GCM under a rotating key ring.
//!
//! Tamper detection here is load-bearing: the evidence store deduplicates
//! by seal, and the audit log refuses mutated events.

#![warn(missing_docs)]

pub mod canonical;
pub mod crypto;
pub mod seal;

pub use canonical::canonicalize;
pub use crypto::{Cipher, EncryptedPayload, KeyRing};
pub use seal::Sealer;

use grc_common::CoreError;
use thiserror::Error;

/// Integrity engine error
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    /// Seal verification failed
    #[error("integrity hash mismatch for {0}")]
    HashMismatch(String),
    /// Stored hash is not valid hex
    #[error("malformed integrity hash: {0}")]
    MalformedHash(String),
    /// No key registered under the requested id
    #[error("unknown encryption key: {0}")]
    UnknownKey(String),
    /// AEAD rejected the ciphertext
    #[error("decryption failed for key {0}")]
    DecryptFailed(String),
    /// Ciphertext or nonce is not valid hex
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

impl From<IntegrityError> for CoreError {
    fn from(err: IntegrityError) -> Self {
        match err {
            IntegrityError::HashMismatch(_) | IntegrityError::MalformedHash(_) => {
                CoreError::Integrity(err.to_string())
            }
            _ => CoreError::Encryption(err.to_string()),
        }
    }
}
