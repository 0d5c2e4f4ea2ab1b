//! Variable-length integer encoding utilities.
//!
//! Token positions travel as posting freight. They are stored as a varint
//! sequence of deltas between consecutive positions, so the common case of a
//! short value costs one byte per position.

use crate::error::{Result, TermsiftError};

/// Encode a u32 value using variable-length encoding.
///
/// Uses 7 bits per byte with a continuation bit, allowing efficient
/// encoding of small numbers.
pub fn encode_u32(value: u32, bytes: &mut Vec<u8>) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Decode a u32 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 32 {
            return Err(TermsiftError::capability("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(TermsiftError::capability("Incomplete VarInt"))
}

/// Encode an ascending position list as varint deltas.
pub fn encode_positions(positions: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(positions.len());
    let mut prev = 0u32;
    for &pos in positions {
        encode_u32(pos - prev, &mut bytes);
        prev = pos;
    }
    bytes
}

/// Decode a position list written by [`encode_positions`].
pub fn decode_positions(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut positions = Vec::new();
    let mut offset = 0;
    let mut prev = 0u32;
    while offset < bytes.len() {
        let (delta, read) = decode_u32(&bytes[offset..])?;
        prev = prev
            .checked_add(delta)
            .ok_or_else(|| TermsiftError::capability("position overflow"))?;
        positions.push(prev);
        offset += read;
    }
    Ok(positions)
}
