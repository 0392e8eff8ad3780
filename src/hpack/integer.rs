//! Prefix-plus-continuation integers (RFC 7541 Section 5.1).

use crate::error::HpackError;

/// Append `value` using an N-bit prefix. `pattern` supplies the
/// representation bits above the prefix in the first byte.
pub fn encode_integer(value: u32, prefix_bits: u8, pattern: u8, out: &mut Vec<u8>) {
    debug_assert!((1..=8).contains(&prefix_bits));
    let max_prefix = ((1u16 << prefix_bits) - 1) as u32;
    if value < max_prefix {
        out.push(pattern | value as u8);
        return;
    }
    out.push(pattern | max_prefix as u8);
    let mut remaining = value - max_prefix;
    while remaining >= 0x80 {
        out.push(0x80 | (remaining & 0x7f) as u8);
        remaining >>= 7;
    }
    out.push(remaining as u8);
}

/// Decode an N-bit prefix integer from the start of `buf`, returning the
/// value and the number of bytes read. Values above `max` are rejected
/// as soon as they are seen, so a peer cannot make us spin on a long
/// continuation run.
pub fn decode_integer(buf: &[u8], prefix_bits: u8, max: u32) -> Result<(u32, usize), HpackError> {
    debug_assert!((1..=8).contains(&prefix_bits));
    let first = *buf.first().ok_or(HpackError::Truncated)?;
    let max_prefix = ((1u16 << prefix_bits) - 1) as u64;
    let mut value = first as u64 & max_prefix;
    if value < max_prefix {
        return check(value, max).map(|v| (v, 1));
    }

    let mut shift = 0u32;
    for (i, &b) in buf[1..].iter().enumerate() {
        value += ((b & 0x7f) as u64) << shift;
        if value > max as u64 {
            return Err(HpackError::IntegerOverflow { max });
        }
        if b & 0x80 == 0 {
            return Ok((value as u32, i + 2));
        }
        shift += 7;
        if shift > 28 {
            return Err(HpackError::IntegerOverflow { max });
        }
    }
    Err(HpackError::Truncated)
}

fn check(value: u64, max: u32) -> Result<u32, HpackError> {
    if value > max as u64 {
        Err(HpackError::IntegerOverflow { max })
    } else {
        Ok(value as u32)
    }
}
