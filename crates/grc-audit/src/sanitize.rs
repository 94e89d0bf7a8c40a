//! Detail sanitisation
//!
//! Secrets and oversize blobs must not reach the log. Keys are matched by
//! substring, case-insensitive, so `api_key` and `Authorization` both hit.

use serde_json::Value;

const SENSITIVE_KEY_PARTS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "credential",
    "authorization",
];

const MAX_STRING_LEN: usize = 1000;
const REDACTED: &str = "[REDACTED]";

/// Sanitise a detail payload before it is appended
pub fn sanitize_details(details: &Value) -> Value {
    match details {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTED.into()));
                } else {
                    out.insert(key.clone(), sanitize_details(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_details).collect()),
        Value::String(s) if s.len() > MAX_STRING_LEN => {
            let mut cut = MAX_STRING_LEN;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            Value::String(format!("{}...[truncated]", &s[..cut]))
        }
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower.contains(part))
}
