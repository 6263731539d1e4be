//! # Canonical Serialization
//!
//! The deterministic byte encoding that makes identical logical states hash
//! identically everywhere, independent of field insertion order, host
//! language, or platform formatting behavior.
//!
//! Rules (followed exactly, in this order of precedence):
//! - Object keys sorted in strict ASCII order, recursively, at every level
//! - Arrays preserve semantic order, except an `"adjacency"` array, which is
//!   sorted lexicographically by member id before serialization
//! - Floats rounded to 8 decimal places using round-half-even, trailing
//!   zeros stripped, at least one fractional digit retained, never emitted
//!   in scientific notation; `-0.0` collapses to `0.0`
//! - NaN/Infinity are rejected with `InvalidValue` before reaching the
//!   byte stream
//! - No whitespace; strings escaped as minimal JSON with lowercase `\u00xx`
//!   for bare control characters
//!
//! This module is purely a function of its input. It never consults
//! `serde_json`'s own float or key formatting.

use crate::types::Stat7Error;
use serde_json::Value;

/// Decimal places retained for every floating-point value.
pub const FLOAT_PRECISION: usize = 8;

const FLOAT_SCALE: f64 = 1e8;

/// The array key whose members are sorted by id during encoding.
const ADJACENCY_KEY: &str = "adjacency";

// =============================================================================
// NUMERIC NORMALIZATION
// =============================================================================

/// Round a finite value to [`FLOAT_PRECISION`] decimal places, ties to even.
///
/// Values too large to carry fractional precision are returned unchanged;
/// they have no fractional bits to round.
#[must_use]
pub fn round_half_even(v: f64) -> f64 {
    let scaled = v * FLOAT_SCALE;
    if !scaled.is_finite() {
        return v;
    }
    scaled.round_ties_even() / FLOAT_SCALE
}

/// Normalize a numeric axis value before storage, hashing or comparison.
///
/// # Errors
///
/// Returns `Stat7Error::InvalidValue` for NaN or Infinity.
pub fn normalize_numeric(v: f64) -> Result<f64, Stat7Error> {
    if !v.is_finite() {
        return Err(Stat7Error::InvalidValue {
            context: "number".to_string(),
            reason: format!("non-finite value {v}"),
        });
    }
    let rounded = round_half_even(v);
    // Collapse -0.0 so the sign bit never leaks into canonical bytes.
    if rounded == 0.0 { Ok(0.0) } else { Ok(rounded) }
}

/// Format a float in canonical decimal form.
///
/// Fixed-point, 8 decimal places rounded ties-to-even, trailing zeros
/// stripped down to at least one fractional digit. Never scientific
/// notation.
///
/// # Errors
///
/// Returns `Stat7Error::InvalidValue` for NaN or Infinity.
pub fn canonical_f64(v: f64) -> Result<String, Stat7Error> {
    let normalized = normalize_numeric(v)?;
    let mut s = format!("{:.prec$}", normalized, prec = FLOAT_PRECISION);
    if let Some(dot) = s.find('.') {
        let keep_at_least = dot + 2;
        while s.len() > keep_at_least && s.ends_with('0') {
            s.pop();
        }
    }
    Ok(s)
}

// =============================================================================
// CANONICAL BYTE ENCODING
// =============================================================================

/// Encode a value tree into its canonical byte sequence.
///
/// # Errors
///
/// Returns `Stat7Error::InvalidValue` if any float is non-finite.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, Stat7Error> {
    let mut out = Vec::with_capacity(128);
    write_value(&mut out, value, None)?;
    Ok(out)
}

/// Encode a value tree into its canonical UTF-8 string.
///
/// Canonical bytes are always valid UTF-8; this is the same encoding as
/// [`canonical_bytes`], for callers that want a readable form.
pub fn canonical_string(value: &Value) -> Result<String, Stat7Error> {
    let bytes = canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| Stat7Error::Serialization(e.to_string()))
}

fn write_value(out: &mut Vec<u8>, value: &Value, key: Option<&str>) -> Result<(), Stat7Error> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            if key == Some(ADJACENCY_KEY) {
                let mut sorted: Vec<&Value> = items.iter().collect();
                sorted.sort_by_key(|member| adjacency_member_id(member));
                write_array(out, &sorted)?;
            } else {
                let in_order: Vec<&Value> = items.iter().collect();
                write_array(out, &in_order)?;
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_escaped(out, k);
                out.push(b':');
                if let Some(child) = map.get(k.as_str()) {
                    write_value(out, child, Some(k.as_str()))?;
                }
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_array(out: &mut Vec<u8>, items: &[&Value]) -> Result<(), Stat7Error> {
    out.push(b'[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_value(out, item, None)?;
    }
    out.push(b']');
    Ok(())
}

fn write_number(out: &mut Vec<u8>, n: &serde_json::Number) -> Result<(), Stat7Error> {
    if let Some(i) = n.as_i64() {
        out.extend_from_slice(i.to_string().as_bytes());
    } else if let Some(u) = n.as_u64() {
        out.extend_from_slice(u.to_string().as_bytes());
    } else if let Some(f) = n.as_f64() {
        out.extend_from_slice(canonical_f64(f)?.as_bytes());
    } else {
        return Err(Stat7Error::InvalidValue {
            context: "number".to_string(),
            reason: format!("unrepresentable number {n}"),
        });
    }
    Ok(())
}

fn write_escaped(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            '\r' => out.extend_from_slice(b"\\r"),
            c if (c as u32) < 0x20 => {
                let escaped = format!("\\u{:04x}", c as u32);
                out.extend_from_slice(escaped.as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// Sort key for adjacency array members: the member's id.
///
/// Members are either bare id strings or `{"id": ..}` objects.
fn adjacency_member_id(member: &Value) -> String {
    match member {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
