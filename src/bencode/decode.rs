//! Bencode decoder
//!
//! Recursive descent over a byte slice, dispatched on the leading byte of each
//! value. Positions are tracked so callers can learn how many bytes a value
//! occupied and recover the raw span of nested values.

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{trace, warn};

use super::value::BencodeValue;
use crate::error::{Result, TorrentError};

/// Deepest container nesting accepted before giving up
pub const MAX_DEPTH: usize = 64;

/// Decode one value from the start of `data`.
///
/// Returns the value and the number of bytes it occupied. Bytes after the
/// value are left untouched; use [`decode_all`] to reject them.
pub fn decode(data: &[u8]) -> Result<(BencodeValue, usize)> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    trace!("Decoded {} from {} bytes", value.type_name(), pos);
    Ok((value, pos))
}

/// Decode a value that must span the whole input
pub fn decode_all(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode(data)?;
    if consumed != data.len() {
        warn!("Trailing data after bencode value: {}/{} bytes consumed", consumed, data.len());
        return Err(TorrentError::parse_error_with_source(
            "Trailing data after value",
            format!("{} of {} bytes consumed", consumed, data.len()),
        ));
    }
    Ok(value)
}

/// Locate the raw bytes of `key`'s value inside the top-level dictionary.
///
/// The span covers the value exactly as it appears in `data`, which is what
/// info-hash computation needs: re-encoding a decoded value can reorder keys.
pub fn dict_value_span(data: &[u8], key: &[u8]) -> Result<Range<usize>> {
    if data.first() != Some(&b'd') {
        return Err(TorrentError::parse_error("Top-level value is not a dictionary"));
    }

    let mut pos = 1;
    while pos < data.len() && data[pos] != b'e' {
        let entry_key = match decode_value(data, &mut pos, 1)? {
            BencodeValue::Bytes(b) => b,
            other => return Err(non_string_key(&other, pos)),
        };
        let start = pos;
        decode_value(data, &mut pos, 1)?;
        if entry_key == key {
            return Ok(start..pos);
        }
    }

    Err(TorrentError::parse_error_with_source(
        "Dictionary key not found",
        String::from_utf8_lossy(key).into_owned(),
    ))
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::parse_error_with_source(
            "Nesting too deep",
            format!("more than {} levels at offset {}", MAX_DEPTH, *pos),
        ));
    }

    let byte = *data
        .get(*pos)
        .ok_or_else(|| unexpected_eof("value", *pos))?;

    match byte {
        b'i' => decode_integer(data, pos),
        b'l' => decode_list(data, pos, depth),
        b'd' => decode_dict(data, pos, depth),
        b'0'..=b'9' => decode_bytes(data, pos),
        other => Err(TorrentError::parse_error_with_source(
            "Unknown bencode type",
            format!("byte 0x{:02x} at offset {}", other, *pos),
        )),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    let start = *pos + 1;
    let end = data[start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| start + p)
        .ok_or_else(|| unexpected_eof("integer terminator", start))?;

    let digits = &data[start..end];
    let invalid = |reason: &str| {
        TorrentError::parse_error_with_source(
            "Invalid integer",
            format!("{} in {:?} at offset {}", reason, String::from_utf8_lossy(digits), start),
        )
    };

    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
        return Err(invalid("not a decimal number"));
    }
    if unsigned[0] == b'0' && digits.len() > 1 {
        // covers "-0", "03" and "-03"
        return Err(invalid("leading zero"));
    }

    let text = std::str::from_utf8(digits).map_err(|_| invalid("not ASCII"))?;
    let value: i64 = text.parse().map_err(|_| invalid("out of range"))?;

    *pos = end + 1;
    Ok(BencodeValue::Integer(value))
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    let start = *pos;
    let colon = data[start..]
        .iter()
        .position(|&b| b == b':')
        .map(|p| start + p)
        .ok_or_else(|| unexpected_eof("string length separator", start))?;

    let len_digits = &data[start..colon];
    let length: usize = std::str::from_utf8(len_digits)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            TorrentError::parse_error_with_source(
                "Invalid string length",
                format!("{:?} at offset {}", String::from_utf8_lossy(len_digits), start),
            )
        })?;

    let body = colon + 1;
    let available = data.len() - body;
    if length > available {
        return Err(TorrentError::parse_error_with_source(
            "String length exceeds input",
            format!("declared {} bytes at offset {}, {} available", length, start, available),
        ));
    }

    *pos = body + length;
    Ok(BencodeValue::Bytes(data[body..*pos].to_vec()))
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *pos;
    *pos += 1;
    let mut list = Vec::new();

    loop {
        match data.get(*pos) {
            Some(b'e') => break,
            Some(_) => list.push(decode_value(data, pos, depth + 1)?),
            None => return Err(unexpected_eof("list terminator", start)),
        }
    }

    *pos += 1;
    Ok(BencodeValue::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *pos;
    *pos += 1;
    let mut dict = BTreeMap::new();

    loop {
        match data.get(*pos) {
            Some(b'e') => break,
            Some(_) => {
                let key_offset = *pos;
                let key = match decode_value(data, pos, depth + 1)? {
                    BencodeValue::Bytes(b) => b,
                    other => return Err(non_string_key(&other, key_offset)),
                };
                let value = decode_value(data, pos, depth + 1)?;
                if dict.contains_key(&key) {
                    return Err(TorrentError::parse_error_with_source(
                        "Duplicate dictionary key",
                        format!("{:?} at offset {}", String::from_utf8_lossy(&key), key_offset),
                    ));
                }
                dict.insert(key, value);
            }
            None => return Err(unexpected_eof("dictionary terminator", start)),
        }
    }

    *pos += 1;
    Ok(BencodeValue::Dict(dict))
}

fn unexpected_eof(expected: &str, offset: usize) -> TorrentError {
    TorrentError::parse_error_with_source(
        "Unexpected end of data",
        format!("expected {} for value starting at offset {}", expected, offset),
    )
}

fn non_string_key(found: &BencodeValue, offset: usize) -> TorrentError {
    TorrentError::parse_error_with_source(
        "Dictionary key must be a byte string",
        format!("found {} at offset {}", found.type_name(), offset),
    )
}
