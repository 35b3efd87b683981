//! Canonical JSON encoding for bundle hashing and payload storage.
//!
//! The encoding follows the RFC 8785 layout rules that matter for a stable
//! digest:
//!
//! 1. Object keys are sorted in lexicographic (byte-order) order
//! 2. No whitespace between tokens
//! 3. Strings use minimal escaping (only required escapes)
//!
//! Numbers are emitted in `serde_json`'s shortest round-trip form. Nesting
//! deeper than [`MAX_DEPTH`] is rejected so a hostile payload cannot exhaust
//! the stack during export.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vigil_core::canonical::to_canonical_string;
//!
//! let canonical = to_canonical_string(&json!({"z": 1, "a": [true, null]})).unwrap();
//! assert_eq!(canonical, r#"{"a":[true,null],"z":1}"#);
//! ```

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum nesting depth accepted by the encoder.
pub const MAX_DEPTH: usize = 128;

/// Errors raised while producing canonical JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalJsonError {
    /// The value nests deeper than [`MAX_DEPTH`].
    #[error("max depth exceeded: JSON nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit.
        max_depth: usize,
    },

    /// The value could not be converted to a JSON tree.
    #[error("value is not representable as JSON: {message}")]
    NotRepresentable {
        /// Conversion failure reported by `serde_json`.
        message: String,
    },
}

/// Encodes a JSON value canonically.
///
/// # Errors
///
/// Returns [`CanonicalJsonError::MaxDepthExceeded`] for over-nested input.
pub fn to_canonical_string(value: &Value) -> Result<String, CanonicalJsonError> {
    let mut output = String::new();
    emit_value(value, &mut output, 0)?;
    Ok(output)
}

/// Serializes any value to a JSON tree and encodes it canonically as UTF-8.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as JSON or nests too
/// deeply.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let tree = serde_json::to_value(value).map_err(|e| CanonicalJsonError::NotRepresentable {
        message: e.to_string(),
    })?;
    to_canonical_string(&tree).map(String::into_bytes)
}

/// Hex-encoded SHA-256 of the canonical encoding of `value`.
///
/// # Errors
///
/// Propagates [`to_canonical_bytes`] failures.
pub fn sha256_hex<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn emit_value(value: &Value, output: &mut String, depth: usize) -> Result<(), CanonicalJsonError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalJsonError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }

    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(arr) => emit_array(arr, output, depth)?,
        Value::Object(obj) => emit_object(obj, output, depth)?,
    }
    Ok(())
}

fn emit_number(n: &Number, output: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(output, "{u}");
    } else {
        output.push_str(&n.to_string());
    }
}

/// Only `"`, `\` and U+0000..=U+001F are escaped; short escapes are used
/// where JSON defines them.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

fn emit_array(arr: &[Value], output: &mut String, depth: usize) -> Result<(), CanonicalJsonError> {
    output.push('[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_value(item, output, depth + 1)?;
    }
    output.push(']');
    Ok(())
}

fn emit_object(
    obj: &Map<String, Value>,
    output: &mut String,
    depth: usize,
) -> Result<(), CanonicalJsonError> {
    let mut sorted_keys: Vec<&String> = obj.keys().collect();
    sorted_keys.sort();

    output.push('{');
    for (i, key) in sorted_keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        emit_string(key, output);
        output.push(':');
        emit_value(&obj[*key], output, depth + 1)?;
    }
    output.push('}');
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_keys_sorted_at_every_level() {
        let value = json!({"outer": {"z": 1, "a": 2}, "b": [{"y": 0, "x": 1}]});
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            r#"{"b":[{"x":1,"y":0}],"outer":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn test_minimal_string_escaping() {
        let value = json!("quote\" slash\\ nl\n bell\u{0007} café");
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            "\"quote\\\" slash\\\\ nl\\n bell\\u0007 café\""
        );
    }

    #[test]
    fn test_numbers() {
        let value = json!({"neg": -7, "big": u64::MAX, "ratio": 0.5});
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            r#"{"big":18446744073709551615,"neg":-7,"ratio":0.5}"#
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!(0);
        for _ in 0..=MAX_DEPTH {
            value = json!([value]);
        }
        assert_eq!(
            to_canonical_string(&value).unwrap_err(),
            CanonicalJsonError::MaxDepthExceeded {
                max_depth: MAX_DEPTH
            }
        );
    }

    #[test]
    fn test_sha256_is_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"d": 2, "c": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"c": 3, "d": 2}, "b": 1}"#).unwrap();
        assert_eq!(sha256_hex(&a).unwrap(), sha256_hex(&b).unwrap());
        assert_eq!(sha256_hex(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_sha256_known_vector() {
        // sha256("{}")
        assert_eq!(
            sha256_hex(&json!({})).unwrap(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
