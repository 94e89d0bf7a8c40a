//! AES-256-GCM payload encryption with a rotating key ring
//!
//! New writes use the current key; reads resolve the key named by the
//! stored `key_id`, so rotation never strands existing ciphertexts.

use crate::IntegrityError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use grc_common::config::EncryptionKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Encrypted payload as persisted alongside an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Hex ciphertext including the GCM tag
    pub ciphertext: String,
    /// Hex 96-bit nonce, unique per encryption
    pub nonce: String,
    /// Key ring id used for this payload
    pub key_id: String,
}

/// Named-key registry supporting rotation
pub struct KeyRing {
    keys: RwLock<HashMap<String, [u8; 32]>>,
    current: RwLock<String>,
}

impl KeyRing {
    /// Build a ring from configured keys; the first entry becomes current
    pub fn new(configured: &[EncryptionKey]) -> Self {
        let mut keys = HashMap::new();
        let mut current = String::new();
        for entry in configured {
            if current.is_empty() {
                current = entry.key_id.clone();
            }
            keys.insert(entry.key_id.clone(), entry.key);
        }
        Self {
            keys: RwLock::new(keys),
            current: RwLock::new(current),
        }
    }

    /// Id of the key used for new writes
    pub fn current_id(&self) -> String {
        self.current.read().clone()
    }

    /// Register a new key and make it current
    pub fn rotate(&self, key_id: &str, key: [u8; 32]) {
        self.keys.write().insert(key_id.to_string(), key);
        *self.current.write() = key_id.to_string();
        tracing::info!(key_id, "encryption key rotated");
    }

    fn get(&self, key_id: &str) -> Option<[u8; 32]> {
        self.keys.read().get(key_id).copied()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.keys.read().len())
            .field("current", &self.current.read().clone())
            .finish()
    }
}

/// AEAD cipher over the key ring
pub struct Cipher {
    ring: KeyRing,
}

impl Cipher {
    /// Create a cipher over the configured ring
    pub fn new(configured: &[EncryptionKey]) -> Self {
        Self {
            ring: KeyRing::new(configured),
        }
    }

    /// Access the underlying ring for rotation
    pub fn ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Encrypt a JSON payload under the current key
    pub fn encrypt(&self, data: &Value) -> Result<EncryptedPayload, IntegrityError> {
        let key_id = self.ring.current_id();
        let key = self
            .ring
            .get(&key_id)
            .ok_or_else(|| IntegrityError::UnknownKey(key_id.clone()))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let plaintext = serde_json::to_vec(data)
            .map_err(|_| IntegrityError::MalformedCiphertext("unencodable payload".into()))?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| IntegrityError::DecryptFailed(key_id.clone()))?;

        Ok(EncryptedPayload {
            ciphertext: hex::encode(ciphertext),
            nonce: hex::encode(nonce),
            key_id,
        })
    }

    /// Decrypt a payload using the key named by its `key_id`
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Value, IntegrityError> {
        let key = self
            .ring
            .get(&payload.key_id)
            .ok_or_else(|| IntegrityError::UnknownKey(payload.key_id.clone()))?;

        let ciphertext = hex::decode(&payload.ciphertext)
            .map_err(|_| IntegrityError::MalformedCiphertext(payload.key_id.clone()))?;
        let nonce_bytes = hex::decode(&payload.nonce)
            .map_err(|_| IntegrityError::MalformedCiphertext(payload.key_id.clone()))?;
        if nonce_bytes.len() != 12 {
            return Err(IntegrityError::MalformedCiphertext(payload.key_id.clone()));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| IntegrityError::DecryptFailed(payload.key_id.clone()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|_| IntegrityError::MalformedCiphertext(payload.key_id.clone()))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("ring", &self.ring).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_key(id: &str, fill: u8) -> EncryptionKey {
        EncryptionKey {
            key_id: id.to_string(),
            key: [fill; 32],
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = Cipher::new(&[test_key("key-1", 7)]);
        let data = json!({"credential": "aws-role-arn", "region": "eu-west-1"});

        let payload = cipher.encrypt(&data).unwrap();
        assert_eq!(payload.key_id, "key-1");
        assert_ne!(payload.ciphertext, "");

        let decrypted = cipher.decrypt(&payload).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn test_nonce_unique_per_encryption() {
        let cipher = Cipher::new(&[test_key("key-1", 7)]);
        let data = json!({"a": 1});
        let p1 = cipher.encrypt(&data).unwrap();
        let p2 = cipher.encrypt(&data).unwrap();
        assert_ne!(p1.nonce, p2.nonce);
        assert_ne!(p1.ciphertext, p2.ciphertext);
    }

    #[test]
    fn test_rotation_keeps_old_reads() {
        let cipher = Cipher::new(&[test_key("key-1", 7)]);
        let data = json!({"secret": "value"});
        let old_payload = cipher.encrypt(&data).unwrap();

        cipher.ring().rotate("key-2", [9; 32]);
        assert_eq!(cipher.ring().current_id(), "key-2");

        // New writes use the new key, old ciphertexts still resolve
        let new_payload = cipher.encrypt(&data).unwrap();
        assert_eq!(new_payload.key_id, "key-2");
        assert_eq!(cipher.decrypt(&old_payload).unwrap(), data);
        assert_eq!(cipher.decrypt(&new_payload).unwrap(), data);
    }

    #[test]
    fn test_unknown_key_errors() {
        let cipher = Cipher::new(&[test_key("key-1", 7)]);
        let mut payload = cipher.encrypt(&json!({"a": 1})).unwrap();
        payload.key_id = "missing".into();
        assert!(matches!(
            cipher.decrypt(&payload),
            Err(IntegrityError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = Cipher::new(&[test_key("key-1", 7)]);
        let mut payload = cipher.encrypt(&json!({"a": 1})).unwrap();
        let mut bytes = hex::decode(&payload.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        payload.ciphertext = hex::encode(bytes);
        assert!(matches!(
            cipher.decrypt(&payload),
            Err(IntegrityError::DecryptFailed(_))
        ));
    }
}
