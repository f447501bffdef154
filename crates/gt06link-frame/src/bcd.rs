//! Packed BCD encoding of device identifiers (IMEI).
//!
//! The identifier is padded with trailing zeros (or truncated) to 15 digits,
//! prefixed with one zero digit and packed two digits per byte, high nibble
//! first: `"123456789"` becomes `01 23 45 67 89 00 00 00`.

use std::iter;

use crate::error::{FrameError, Result};

/// Number of identifier digits carried on the wire.
pub const IDENTIFIER_DIGITS: usize = 15;

/// Encoded identifier size in bytes.
pub const BCD_LEN: usize = 8;

/// Pad with trailing `'0'` or truncate `id` to exactly 15 characters.
pub fn pad_identifier(id: &str) -> String {
    id.chars()
        .chain(iter::repeat('0'))
        .take(IDENTIFIER_DIGITS)
        .collect()
}

/// Encode an identifier as 8 bytes of packed BCD.
///
/// Fails with [`FrameError::InvalidIdentifier`] if the padded identifier
/// contains anything other than ASCII digits.
pub fn encode_bcd(id: &str) -> Result<[u8; BCD_LEN]> {
    let padded = pad_identifier(id);
    if !padded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::InvalidIdentifier(id.to_string()));
    }

    let digits: Vec<u8> = iter::once(0)
        .chain(padded.bytes().map(|b| b - b'0'))
        .collect();

    let mut out = [0u8; BCD_LEN];
    for (slot, pair) in out.iter_mut().zip(digits.chunks_exact(2)) {
        *slot = (pair[0] << 4) | pair[1];
    }
    Ok(out)
}

/// Decode 8 BCD bytes back to the 15-digit padded identifier.
pub fn decode_bcd(bytes: &[u8; BCD_LEN]) -> Result<String> {
    let mut digits = String::with_capacity(BCD_LEN * 2);
    for (offset, &byte) in bytes.iter().enumerate() {
        let (high, low) = (byte >> 4, byte & 0x0F);
        if high > 9 || low > 9 {
            return Err(FrameError::InvalidBcd { byte, offset });
        }
        digits.push(char::from(b'0' + high));
        digits.push(char::from(b'0' + low));
    }
    // Drop the leading filler digit.
    Ok(digits.split_off(1))
}
