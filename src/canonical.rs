//! Canonical JSON serialization
//!
//! Payloads are compared and measured through a key-sorted, whitespace-free
//! rendering so the result does not depend on the order in which a producer
//! happened to insert object keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Default heuristic: roughly four characters of JSON per model token
pub const DEFAULT_CHARS_PER_TOKEN: u64 = 4;

/// Render a JSON value with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a &str cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Estimate the token cost of a payload from its canonical character length
pub fn estimate_tokens(payload: &Value, chars_per_token: u64) -> u64 {
    let chars = canonical_json(payload).chars().count() as u64;
    chars / chars_per_token.max(1)
}

/// SHA-256 of the canonical rendering, hex encoded
pub fn result_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}
