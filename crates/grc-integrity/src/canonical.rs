//! Deterministic record canonicalisation
//!
//! Maps a JSON value onto a unique byte sequence: map keys sorted bytewise,
//! every element tagged and length-prefixed. Two values that differ only in
//! key order or representation produce identical bytes, so seals and dedup
//! hashes are stable across producers.

use serde_json::Value;
use std::collections::BTreeMap;

const TAG_NULL: u8 = b'n';
const TAG_BOOL: u8 = b'b';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'f';
const TAG_STRING: u8 = b's';
const TAG_ARRAY: u8 = b'a';
const TAG_MAP: u8 = b'm';

/// Encode a value into its canonical byte form
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    encode(value, &mut out);
    out
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        Value::Number(n) => {
            // Integers and floats are tagged apart so 1 and 1.0 cannot
            // collide with each other across producers.
            if let Some(i) = n.as_i64() {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_be_bytes());
            } else if let Some(u) = n.as_u64() {
                out.push(TAG_INT);
                out.extend_from_slice(&(u as i64).to_be_bytes());
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                out.push(TAG_FLOAT);
                out.extend_from_slice(&f.to_bits().to_be_bytes());
            }
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                encode(item, out);
            }
        }
        Value::Object(map) => {
            // BTreeMap gives bytewise key order independent of insertion
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push(TAG_MAP);
            out.extend_from_slice(&(sorted.len() as u32).to_be_bytes());
            for (key, val) in sorted {
                out.extend_from_slice(&(key.len() as u32).to_be_bytes());
                out.extend_from_slice(key.as_bytes());
                encode(val, out);
            }
        }
    }
}
