//! Fixed-width binary encodings shared by the backends
//!
//! Two encodings live here and both are part of the on-disk layout:
//!
//! - **values**: `f64` as 8 little-endian IEEE-754 bytes
//! - **timestamp keys**: `i64` nanoseconds as 8 big-endian bytes with the
//!   sign bit flipped, so that unsigned byte order equals numeric order
//!   (including instants before the epoch)

use chrono::{DateTime, Utc};

/// Width of every encoded value and timestamp key
pub const ENCODED_LEN: usize = 8;

const SIGN_BIT: u64 = 1 << 63;

pub fn encode_f64(value: f64) -> [u8; ENCODED_LEN] {
    value.to_le_bytes()
}

/// Decode a value written by [`encode_f64`]. Anything that is not exactly
/// eight bytes is rejected.
pub fn decode_f64(bytes: &[u8]) -> Option<f64> {
    let bytes: [u8; ENCODED_LEN] = bytes.try_into().ok()?;
    Some(f64::from_le_bytes(bytes))
}

pub fn encode_timestamp(nanos: i64) -> [u8; ENCODED_LEN] {
    ((nanos as u64) ^ SIGN_BIT).to_be_bytes()
}

pub fn decode_timestamp(bytes: &[u8]) -> Option<i64> {
    let bytes: [u8; ENCODED_LEN] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64)
}

/// Nanoseconds since the epoch, saturating outside the representable range
/// (roughly years 1677 to 2262).
pub fn timestamp_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
