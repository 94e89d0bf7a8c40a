//! HMAC-SHA256 record sealing

use crate::canonical::canonicalize;
use crate::IntegrityError;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Seals and verifies records against a shared integrity key
#[derive(Clone)]
pub struct Sealer {
    key: Vec<u8>,
}

impl Sealer {
    /// Create a sealer over the given integrity key
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// Hex-encoded HMAC-SHA256 over the record's canonical bytes
    pub fn seal(&self, record: &Value) -> String {
        self.seal_bytes(&canonicalize(record))
    }

    /// Seal pre-canonicalised bytes
    pub fn seal_bytes(&self, canonical: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts any key length");
        mac.update(canonical);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a record against its stored seal
    ///
    /// Comparison happens inside the MAC (constant time); a malformed
    /// stored hash counts as tampering.
    pub fn verify(&self, record: &Value, sealed: &str) -> bool {
        let Ok(expected) = hex::decode(sealed) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("hmac accepts any key length");
        mac.update(&canonicalize(record));
        mac.verify_slice(&expected).is_ok()
    }

    /// Verify, surfacing the failure as an error for fatal paths
    pub fn verify_strict(&self, record: &Value, sealed: &str, label: &str) -> Result<(), IntegrityError> {
        if hex::decode(sealed).is_err() {
            return Err(IntegrityError::MalformedHash(label.to_string()));
        }
        if !self.verify(record, sealed) {
            return Err(IntegrityError::HashMismatch(label.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seal_then_verify() {
        let sealer = Sealer::new(b"test-integrity-key");
        let record = json!({"control_id": "CC6.1", "status": "verified"});
        let seal = sealer.seal(&record);
        assert!(sealer.verify(&record, &seal));
    }

    #[test]
    fn test_tamper_detected() {
        let sealer = Sealer::new(b"test-integrity-key");
        let record = json!({"control_id": "CC6.1", "status": "verified"});
        let seal = sealer.seal(&record);

        let tampered = json!({"control_id": "CC6.1", "status": "rejected"});
        assert!(!sealer.verify(&tampered, &seal));
        assert!(sealer.verify_strict(&tampered, &seal, "evidence").is_err());
    }

    #[test]
    fn test_malformed_hash_rejected() {
        let sealer = Sealer::new(b"test-integrity-key");
        let record = json!({"a": 1});
        assert!(!sealer.verify(&record, "not-hex"));
        assert!(matches!(
            sealer.verify_strict(&record, "zz", "audit"),
            Err(IntegrityError::MalformedHash(_))
        ));
    }

    #[test]
    fn test_key_separation() {
        let record = json!({"a": 1});
        let seal = Sealer::new(b"key-one").seal(&record);
        assert!(!Sealer::new(b"key-two").verify(&record, &seal));
    }

    #[test]
    fn test_equal_content_equal_seal() {
        let sealer = Sealer::new(b"k");
        let a = json!({"x": 1, "y": [1, 2]});
        let b = json!({"y": [1, 2], "x": 1});
        assert_eq!(sealer.seal(&a), sealer.seal(&b));
    }
}
