//! Canonical CBOR encoding for deterministic serialization.
//!
//! RFC 8949 core deterministic encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Headers are hashed and signed over this encoding, so two headers with the
//! same fields produce identical bytes no matter the order fields were set in.

use std::collections::BTreeMap;

use ciborium::value::Value;

use crate::error::CoreError;
use crate::header::FieldValue;

/// Encode a header field map to canonical bytes.
pub fn encode_fields(fields: &BTreeMap<String, FieldValue>) -> Vec<u8> {
    let mut entries: Vec<(Vec<u8>, &FieldValue)> = fields
        .iter()
        .map(|(name, value)| {
            let mut key = Vec::with_capacity(name.len() + 1);
            encode_text(&mut key, name);
            (key, value)
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    encode_uint(&mut buf, 5, entries.len() as u64);
    for (key, value) in entries {
        buf.extend_from_slice(&key);
        encode_field_value(&mut buf, value);
    }
    buf
}

/// Decode a canonical header field map.
///
/// Rejects anything that would not re-encode to the same bytes, so a decoded
/// header always hashes to the digest of its wire form.
pub fn decode_fields(bytes: &[u8]) -> Result<BTreeMap<String, FieldValue>, CoreError> {
    let value = decode_value(bytes)?;
    let entries = match value {
        Value::Map(entries) => entries,
        _ => return Err(CoreError::DecodingError("header is not a map".into())),
    };

    let mut fields = BTreeMap::new();
    for (key, value) in entries {
        let name = match key {
            Value::Text(name) => name,
            other => {
                return Err(CoreError::DecodingError(format!(
                    "header key is not text: {:?}",
                    other
                )))
            }
        };
        let value = field_value_from_cbor(value)?;
        if fields.insert(name.clone(), value).is_some() {
            return Err(CoreError::DecodingError(format!("duplicate field {}", name)));
        }
    }

    if encode_fields(&fields) != bytes {
        return Err(CoreError::DecodingError("non-canonical header encoding".into()));
    }
    Ok(fields)
}

/// Encode an arbitrary CBOR value canonically.
pub fn canonical_value_bytes(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Parse a single CBOR item, rejecting trailing bytes.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CoreError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value: Value =
        ciborium::from_reader(&mut cursor).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    if cursor.position() as usize != bytes.len() {
        return Err(CoreError::DecodingError("trailing bytes after CBOR item".into()));
    }
    Ok(value)
}

fn field_value_from_cbor(value: Value) -> Result<FieldValue, CoreError> {
    match value {
        Value::Integer(i) => i64::try_from(i)
            .map(FieldValue::Int)
            .map_err(|_| CoreError::UnsupportedValue("integer out of i64 range".into())),
        Value::Bytes(b) => Ok(FieldValue::Bytes(b)),
        Value::Text(s) => Ok(FieldValue::Text(s)),
        Value::Bool(b) => Ok(FieldValue::Bool(b)),
        other => Err(CoreError::UnsupportedValue(format!("{:?}", other))),
    }
}

fn encode_field_value(buf: &mut Vec<u8>, value: &FieldValue) {
    match value {
        FieldValue::Int(n) => encode_int(buf, i128::from(*n)),
        FieldValue::Bytes(b) => encode_bytes(buf, b),
        FieldValue::Text(s) => encode_text(buf, s),
        FieldValue::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
    }
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_int(buf, i128::from(*i)),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(items) => {
            encode_uint(buf, 4, items.len() as u64);
            for item in items {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        other => {
            return Err(CoreError::EncodingError(format!(
                "unsupported CBOR value in canonical encoding: {:?}",
                other
            )))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_int(buf: &mut Vec<u8>, n: i128) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map with keys sorted by their encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key = Vec::new();
        encode_value_to(&mut key, k)?;
        pairs.push((key, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key, value) in pairs {
        buf.extend_from_slice(&key);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_int(&mut buf, -1);
        assert_eq!(buf, vec![0x20]);

        buf.clear();
        encode_int(&mut buf, -500);
        assert_eq!(buf, vec![0x39, 0x01, 0xf3]);
    }

    #[test]
    fn test_keys_sorted_length_first() {
        // "Ver" (3 bytes) must precede "Path" (4 bytes) even though 'P' < 'V'.
        let bytes = encode_fields(&fields(&[
            ("Path", FieldValue::Text("/".into())),
            ("Ver", FieldValue::Int(1)),
        ]));
        assert_eq!(bytes[0], 0xa2);
        assert_eq!(&bytes[1..5], &[0x63, b'V', b'e', b'r']);
        assert_eq!(bytes[5], 0x01);
        assert_eq!(&bytes[6..11], &[0x64, b'P', b'a', b't', b'h']);
    }

    #[test]
    fn test_fields_roundtrip() {
        let original = fields(&[
            ("Path", FieldValue::Text("/a.txt".into())),
            ("Size", FieldValue::Int(1500)),
            ("Updated", FieldValue::Int(-3)),
            ("Merkle", FieldValue::Bytes(vec![7; 32])),
            ("Deleted", FieldValue::Bool(true)),
        ]);
        let bytes = encode_fields(&original);
        assert_eq!(decode_fields(&bytes).unwrap(), original);
    }

    #[test]
    fn test_decode_rejects_non_canonical() {
        // {"b": 1, "a": 2} with keys out of order.
        let bytes = vec![0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(decode_fields(&bytes).is_err());

        // 1 encoded with a needless length byte.
        let bytes = vec![0xa1, 0x61, b'a', 0x18, 0x01];
        assert!(decode_fields(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode_fields(&fields(&[("a", FieldValue::Int(1))]));
        bytes.push(0x00);
        assert!(decode_fields(&bytes).is_err());
    }

    #[test]
    fn test_value_map_sorted() {
        let value = Value::Map(vec![
            (Value::Integer(2.into()), Value::Null),
            (Value::Integer(0.into()), Value::Bool(true)),
        ]);
        let bytes = canonical_value_bytes(&value).unwrap();
        assert_eq!(bytes, vec![0xa2, 0x00, 0xf5, 0x02, 0xf6]);
    }

    #[test]
    fn test_float_rejected() {
        assert!(canonical_value_bytes(&Value::Float(1.5)).is_err());
    }
}
