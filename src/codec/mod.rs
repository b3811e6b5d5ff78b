//! Codec Module
//!
//! Byte encoding of cached values.
//!
//! # Format
//! - Top-level integers are plain decimal ASCII, so the backing store can
//!   increment them in place.
//! - Everything else is `ENVELOPE_MAGIC`, one format byte, then a JSON
//!   document of the tagged [`Value`].
//! - Herd payloads are `HERD_MAGIC`, an 8-byte big-endian Unix-millisecond
//!   stale instant, then one of the above.

mod value;

pub use value::Value;

use num_bigint::BigInt;

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Leading bytes of every non-integer payload
pub const ENVELOPE_MAGIC: &[u8] = b"\x00rc";

/// Current envelope format
pub const FORMAT_VERSION: u8 = 1;

/// Leading bytes of a payload carrying a soft (stale) expiry
pub const HERD_MAGIC: &[u8] = b"\x00rh";

// == Encode ==
/// Encodes a value into the bytes written to the store.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Int(n) => Ok(n.to_string().into_bytes()),
        Value::BigInt(n) => Ok(n.to_string().into_bytes()),
        other => {
            other.ensure_encodable()?;
            let mut out = Vec::with_capacity(64);
            out.extend_from_slice(ENVELOPE_MAGIC);
            out.push(FORMAT_VERSION);
            serde_json::to_writer(&mut out, other)
                .map_err(|e| CacheError::Codec(e.to_string()))?;
            Ok(out)
        }
    }
}

// == Decode ==
/// Decodes bytes read from the store.
///
/// Herd payloads decode to their inner value; the stale instant is ignored.
/// Big integers that fit in 64 bits come back as `Int` at any depth.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    if let Some((_, inner)) = unpack_herd(bytes) {
        return decode(inner);
    }
    if let Some(rest) = bytes.strip_prefix(ENVELOPE_MAGIC) {
        return match rest.split_first() {
            Some((&FORMAT_VERSION, body)) => serde_json::from_slice::<Value>(body)
                .map(Value::normalized)
                .map_err(|e| CacheError::Codec(e.to_string())),
            Some((version, _)) => Err(CacheError::Codec(format!(
                "unsupported encoding format {}",
                version
            ))),
            None => Err(CacheError::Codec("truncated envelope".to_string())),
        };
    }

    parse_integer(bytes)
        .map(Value::integer)
        .ok_or_else(|| CacheError::Codec("payload is not a cached value".to_string()))
}

// == Herd Envelope ==
/// Wraps an encoded payload with the instant (Unix ms) after which readers
/// treat it as stale.
pub fn pack_herd(payload: &[u8], stale_at_ms: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HERD_MAGIC.len() + 8 + payload.len());
    out.extend_from_slice(HERD_MAGIC);
    out.extend_from_slice(&stale_at_ms.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Splits a herd payload into its stale instant and inner payload. None for
/// anything else, including a truncated header.
pub fn unpack_herd(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let rest = bytes.strip_prefix(HERD_MAGIC)?;
    if rest.len() < 8 {
        return None;
    }
    let (stamp, payload) = rest.split_at(8);
    let stamp: [u8; 8] = stamp.try_into().ok()?;
    Some((u64::from_be_bytes(stamp), payload))
}

// == Integer Parsing ==
/// Parses a strict decimal integer: optional `-`, then one or more digits.
///
/// Shared by the decoder and the in-memory store's increment so both accept
/// exactly what Redis `INCRBY` accepts and produces.
pub(crate) fn parse_integer(bytes: &[u8]) -> Option<BigInt> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    match text.parse::<i64>() {
        Ok(n) => Some(BigInt::from(n)),
        Err(_) => text.parse::<BigInt>().ok(),
    }
}
