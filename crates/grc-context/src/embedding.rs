//! Deterministic hash-mix embeddings
//!
//! Near-duplicate detection for learning and policy entries, not semantic
//! search. Each token of the flattened payload is hashed into a fixed
//! 256-dim vector; cosine similarity >= 0.9 flags a near-duplicate. A
//! real embedding provider can replace this type without changing the
//! store contract.

use serde_json::Value;

/// Embedding dimensionality
pub const EMBEDDING_DIM: usize = 256;

/// Deterministic embedder over JSON payloads
#[derive(Debug, Default, Clone)]
pub struct Embedder;

impl Embedder {
    /// Create an embedder
    pub fn new() -> Self {
        Self
    }

    /// Embed a payload into a unit-normalised vector
    pub fn embed(&self, data: &Value) -> Vec<f32> {
        let mut vector = vec![0f32; EMBEDDING_DIM];
        let mut tokens = Vec::new();
        flatten(data, "", &mut tokens);

        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let index = (hash as usize) % EMBEDDING_DIM;
            // Second independent hash decides the sign so vectors spread
            // over the whole space instead of the positive orthant
            let sign = if fnv1a(&hash.to_be_bytes()) & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    /// Cosine similarity between two embeddings
    pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

fn flatten(value: &Value, prefix: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(val, &path, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(item, prefix, out);
            }
        }
        scalar => out.push(format!("{}={}", prefix, scalar)),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deterministic() {
        let embedder = Embedder::new();
        let data = json!({"rule": "mfa required", "scope": "admins"});
        assert_eq!(embedder.embed(&data), embedder.embed(&data));
    }

    #[test]
    fn test_identical_payloads_similarity_one() {
        let embedder = Embedder::new();
        let a = embedder.embed(&json!({"policy": "retain 7 years", "region": "eu"}));
        let b = embedder.embed(&json!({"region": "eu", "policy": "retain 7 years"}));
        assert!(Embedder::cosine(&a, &b) > 0.999);
    }

    #[test]
    fn test_near_duplicate_scores_high() {
        let embedder = Embedder::new();
        let base: Value = json!({
            "q1": "Do you encrypt data at rest?",
            "q2": "Do you rotate keys annually?",
            "q3": "Is MFA enforced for admins?",
            "q4": "Are backups tested quarterly?",
            "q5": "Is access reviewed monthly?",
            "q6": "Are audit logs retained?",
            "q7": "Is TLS 1.2 minimum?",
            "q8": "Are vendors assessed?",
            "q9": "Is training annual?",
            "q10": "Are incidents drilled?"
        });
        let mut near = base.clone();
        near["q10"] = json!("Are incidents rehearsed?");

        let a = embedder.embed(&base);
        let b = embedder.embed(&near);
        assert!(Embedder::cosine(&a, &b) >= 0.9);
    }

    #[test]
    fn test_unrelated_payloads_score_low() {
        let embedder = Embedder::new();
        let a = embedder.embed(&json!({"topic": "encryption", "detail": "aes-256-gcm everywhere"}));
        let b = embedder.embed(&json!({"vendor": "acme", "invoice": 42, "status": "paid"}));
        assert!(Embedder::cosine(&a, &b) < 0.9);
    }
}
