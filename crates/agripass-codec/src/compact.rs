// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compact token pipeline for offline QR payloads.
//
//   encode:  record -> CBOR map -> zlib (best) -> base45 -> "AGQ1:" + text
//   decode:  strip prefix -> base45 -> inflate (bounded) -> CBOR map
//            on any failure: parse the raw input as a JSON object instead
//
// Values that CBOR can carry but a JSON record cannot (byte strings, tags,
// non-finite floats, integers beyond 64 bits) are refused at encode time so
// that `decode(encode(x)) == x` holds for everything `encode` accepts.

use std::io::{Read, Write};

use agripass_core::error::{AgripassError, Result};
use ciborium::Value as Cbor;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::base45;

/// Marker distinguishing compact tokens from plain JSON tokens.
pub const TOKEN_PREFIX: &str = "AGQ1:";

/// Upper bound on the inflated payload. Scanned tokens are untrusted input.
pub const MAX_INFLATED_BYTES: u64 = 64 * 1024;

/// A decoded token record: string keys to JSON values.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Which strategy produced a decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFormat {
    /// CBOR/zlib/base45 pipeline, with or without the prefix.
    Compact,
    /// Plain JSON text from an older producer.
    PlainJson,
}

/// Result of a successful [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub record: Record,
    pub format: TokenFormat,
}

fn encode_err(stage: &str, detail: impl std::fmt::Display) -> AgripassError {
    AgripassError::Encode(format!("{stage}: {detail}"))
}

fn json_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_owned()
    } else {
        format!("$.{}", path.join("."))
    }
}

/// Check that a CBOR value stays inside the JSON-record subset.
fn check_representable(value: &Cbor, path: &mut Vec<String>) -> Result<()> {
    match value {
        Cbor::Null | Cbor::Bool(_) | Cbor::Text(_) => Ok(()),
        Cbor::Integer(i) => {
            let n = i128::from(*i);
            if n < i128::from(i64::MIN) || n > i128::from(u64::MAX) {
                Err(encode_err("unrepresentable", format!("integer out of range at {}", json_path(path))))
            } else {
                Ok(())
            }
        }
        Cbor::Float(f) if f.is_finite() => Ok(()),
        Cbor::Float(f) => Err(encode_err(
            "unrepresentable",
            format!("non-finite number {f} at {}", json_path(path)),
        )),
        Cbor::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                check_representable(item, path)?;
                path.pop();
            }
            Ok(())
        }
        Cbor::Map(entries) => {
            for (key, item) in entries {
                let Cbor::Text(key) = key else {
                    return Err(encode_err(
                        "unrepresentable",
                        format!("non-string map key at {}", json_path(path)),
                    ));
                };
                path.push(key.clone());
                check_representable(item, path)?;
                path.pop();
            }
            Ok(())
        }
        Cbor::Bytes(_) => Err(encode_err(
            "unrepresentable",
            format!("byte string at {}", json_path(path)),
        )),
        Cbor::Tag(tag, _) => Err(encode_err(
            "unrepresentable",
            format!("tagged value ({tag}) at {}", json_path(path)),
        )),
        _ => Err(encode_err(
            "unrepresentable",
            format!("unsupported CBOR value at {}", json_path(path)),
        )),
    }
}

/// Encode a structured record as a prefixed compact token.
///
/// The top level must serialize to a map. Nothing is partially encoded: any
/// stage failure is an `AgripassError::Encode`.
#[instrument(skip_all)]
pub fn encode<T: Serialize + ?Sized>(record: &T) -> Result<String> {
    let value = Cbor::serialized(record).map_err(|e| encode_err("cbor", e))?;
    if !matches!(value, Cbor::Map(_)) {
        return Err(encode_err("unrepresentable", "top-level value is not a map"));
    }
    check_representable(&value, &mut Vec::new())?;

    let mut cbor = Vec::new();
    ciborium::into_writer(&value, &mut cbor).map_err(|e| encode_err("cbor", e))?;

    let mut deflater = ZlibEncoder::new(Vec::new(), Compression::best());
    deflater
        .write_all(&cbor)
        .map_err(|e| encode_err("deflate", e))?;
    let compressed = deflater.finish().map_err(|e| encode_err("deflate", e))?;

    let token = format!("{TOKEN_PREFIX}{}", base45::encode(&compressed));
    debug!(
        cbor_bytes = cbor.len(),
        compressed_bytes = compressed.len(),
        token_chars = token.len(),
        "token encoded"
    );
    Ok(token)
}

fn decode_compact(payload: &str) -> Result<Record> {
    let compressed = base45::decode(payload)?;

    let mut inflated = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_BYTES + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| AgripassError::Decode(format!("inflate: {e}")))?;
    if inflated.len() as u64 > MAX_INFLATED_BYTES {
        return Err(AgripassError::Decode(format!(
            "inflated payload exceeds {MAX_INFLATED_BYTES} bytes"
        )));
    }

    let value: serde_json::Value = ciborium::from_reader(inflated.as_slice())
        .map_err(|e| AgripassError::Decode(format!("cbor: {e}")))?;
    match value {
        serde_json::Value::Object(record) => Ok(record),
        other => Err(AgripassError::Decode(format!(
            "expected a map, found {}",
            json_kind(&other)
        ))),
    }
}

fn decode_json(raw: &str) -> Result<Record> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(record)) => Ok(record),
        Ok(other) => Err(AgripassError::Decode(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(AgripassError::Decode(format!("json: {e}"))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Decode a scanned token.
///
/// Tries the compact pipeline first, then plain JSON. Only when both fail is
/// an `AgripassError::Decode` returned, carrying both reasons.
#[instrument(skip_all, fields(len = input.len()))]
pub fn decode(input: &str) -> Result<DecodedToken> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(AgripassError::Decode("empty token".into()));
    }

    let payload = raw.strip_prefix(TOKEN_PREFIX).unwrap_or(raw);
    let compact_err = match decode_compact(payload) {
        Ok(record) => {
            return Ok(DecodedToken {
                record,
                format: TokenFormat::Compact,
            });
        }
        Err(e) => e,
    };
    debug!(error = %compact_err, "compact decode failed, trying plain JSON");

    match decode_json(raw) {
        Ok(record) => Ok(DecodedToken {
            record,
            format: TokenFormat::PlainJson,
        }),
        Err(json_err) => Err(AgripassError::Decode(format!(
            "not a compact token ({}) nor a JSON record ({})",
            strip_decode(compact_err),
            strip_decode(json_err)
        ))),
    }
}

fn strip_decode(err: AgripassError) -> String {
    match err {
        AgripassError::Decode(detail) => detail,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario() -> serde_json::Value {
        json!({
            "id": "CERT-001",
            "prod": "Basmati Rice",
            "grade": "A",
            "stat": "V",
            "date": "2024-06-01"
        })
    }

    #[test]
    fn scenario_round_trip() {
        let token = encode(&scenario()).unwrap();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert!(
            token[TOKEN_PREFIX.len()..]
                .bytes()
                .all(|c| base45::ALPHABET.contains(&c))
        );

        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.format, TokenFormat::Compact);
        assert_eq!(serde_json::Value::Object(decoded.record), scenario());
    }

    #[test]
    fn corrupted_middle_character_fails_both_paths() {
        let token = encode(&scenario()).unwrap();
        let payload_start = TOKEN_PREFIX.len();
        let mid = payload_start + (token.len() - payload_start) / 2;
        let original = token.as_bytes()[mid];
        let replacement = if original == b'0' { '1' } else { '0' };

        let mut corrupted = token.clone();
        corrupted.replace_range(mid..=mid, &replacement.to_string());
        assert_ne!(corrupted, token);

        let err = decode(&corrupted).unwrap_err();
        assert!(matches!(err, AgripassError::Decode(_)));
    }

    #[test]
    fn plain_json_is_accepted() {
        let text = serde_json::to_string(&scenario()).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.format, TokenFormat::PlainJson);
        assert_eq!(serde_json::Value::Object(decoded.record), scenario());
    }

    #[test]
    fn unprefixed_payload_is_accepted() {
        let token = encode(&scenario()).unwrap();
        let bare = token.strip_prefix(TOKEN_PREFIX).unwrap();
        let decoded = decode(bare).unwrap();
        assert_eq!(decoded.format, TokenFormat::Compact);
        assert_eq!(serde_json::Value::Object(decoded.record), scenario());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let token = encode(&scenario()).unwrap();
        assert!(decode(&format!("  {token}\n")).is_ok());
    }

    #[test]
    fn empty_input_fails() {
        assert!(decode("").is_err());
        assert!(decode("   ").is_err());
    }

    #[test]
    fn json_scalars_are_not_records() {
        assert!(decode("42").is_err());
        assert!(decode("[1,2,3]").is_err());
    }

    #[test]
    fn decode_is_idempotent() {
        let token = encode(&scenario()).unwrap();
        assert_eq!(decode(&token).unwrap(), decode(&token).unwrap());
    }

    #[test]
    fn nested_values_survive() {
        let record = json!({
            "id": "CERT-0A1B2C3D",
            "qa": {"grade": "B+", "moisture": 12.5, "checks": [true, false, null]},
            "qty": 18_000,
            "delta": -3
        });
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(serde_json::Value::Object(decoded.record), record);
    }

    #[test]
    fn non_finite_numbers_are_refused() {
        #[derive(Serialize)]
        struct Reading {
            moisture: f64,
        }
        let err = encode(&Reading { moisture: f64::NAN }).unwrap_err();
        assert!(matches!(err, AgripassError::Encode(_)));
    }

    #[test]
    fn top_level_must_be_a_map() {
        assert!(encode(&json!(["CERT-001"])).is_err());
        assert!(encode("CERT-001").is_err());
    }

    #[test]
    fn non_string_keys_are_refused() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(1u8, "one");
        assert!(encode(&map).is_err());
    }

    #[test]
    fn oversized_inflate_is_refused() {
        let big = "A".repeat(MAX_INFLATED_BYTES as usize + 16);
        let record = json!({ "pad": big });
        let token = encode(&record).unwrap();
        assert!(decode(&token).is_err());
    }
}
