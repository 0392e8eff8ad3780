//! HPACK Huffman coding (RFC 7541 Section 5.2, Appendix B).
//!
//! The code is canonical, so only the code length of each symbol is stored;
//! the codes themselves and the per-length decode ranges are derived at
//! compile time.

use crate::error::HpackError;

const EOS: u16 = 256;
const MAX_CODE_LEN: usize = 30;

/// Code length in bits for symbols 0..=255 and EOS (256).
#[rustfmt::skip]
const CODE_LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28,
    28, 28, 28, 28, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 28,
     6, 10, 10, 12, 13,  6,  8, 11, 10, 10,  8, 11,  8,  6,  6,  6,
     5,  5,  5,  6,  6,  6,  6,  6,  6,  6,  7,  8, 15,  6, 12, 10,
    13,  6,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,
     7,  7,  7,  7,  7,  7,  7,  7,  8,  7,  8, 13, 19, 13, 14,  6,
    15,  5,  6,  5,  6,  5,  6,  6,  6,  5,  7,  7,  6,  6,  6,  5,
     6,  7,  6,  5,  5,  6,  7,  7,  7,  7,  7, 15, 11, 14, 13, 28,
    20, 22, 20, 20, 22, 22, 22, 23, 22, 23, 23, 23, 23, 23, 24, 23,
    24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23, 23, 24,
    22, 21, 20, 22, 22, 23, 23, 21, 23, 22, 22, 24, 21, 22, 23, 23,
    21, 21, 22, 21, 23, 22, 23, 23, 20, 22, 22, 22, 23, 22, 22, 23,
    26, 26, 20, 19, 22, 23, 22, 25, 26, 26, 26, 27, 27, 26, 24, 25,
    19, 21, 26, 27, 27, 26, 27, 24, 21, 21, 26, 26, 28, 27, 27, 27,
    20, 24, 20, 21, 22, 21, 21, 23, 22, 22, 25, 25, 24, 24, 26, 23,
    26, 27, 26, 26, 27, 27, 27, 27, 27, 28, 27, 27, 27, 27, 27, 26,
    30,
];

struct CodeTable {
    /// Code of each symbol, right-aligned.
    codes: [u32; 257],
    /// Symbols sorted by (length, symbol).
    symbols: [u16; 257],
    /// Number of codes of each length.
    count: [u16; MAX_CODE_LEN + 1],
    /// First code of each length.
    first_code: [u32; MAX_CODE_LEN + 1],
    /// Position in `symbols` of the first code of each length.
    first_index: [u16; MAX_CODE_LEN + 1],
}

const fn build_table() -> CodeTable {
    let mut count = [0u16; MAX_CODE_LEN + 1];
    let mut s = 0;
    while s < 257 {
        count[CODE_LENGTHS[s] as usize] += 1;
        s += 1;
    }

    let mut symbols = [0u16; 257];
    let mut first_index = [0u16; MAX_CODE_LEN + 1];
    let mut next = 0u16;
    let mut len = 1;
    while len <= MAX_CODE_LEN {
        first_index[len] = next;
        let mut s = 0;
        while s < 257 {
            if CODE_LENGTHS[s] as usize == len {
                symbols[next as usize] = s as u16;
                next += 1;
            }
            s += 1;
        }
        len += 1;
    }

    let mut codes = [0u32; 257];
    let mut first_code = [0u32; MAX_CODE_LEN + 1];
    let mut code = 0u32;
    let mut len = 1;
    while len <= MAX_CODE_LEN {
        first_code[len] = code;
        let mut j = 0u16;
        while j < count[len] {
            let sym = symbols[(first_index[len] + j) as usize];
            codes[sym as usize] = code + j as u32;
            j += 1;
        }
        code = (code + count[len] as u32) << 1;
        len += 1;
    }

    CodeTable {
        codes,
        symbols,
        count,
        first_code,
        first_index,
    }
}

static TABLE: CodeTable = build_table();

/// Code and bit length for a symbol (0..=255, or 256 for EOS).
pub fn code_of(symbol: u16) -> (u32, u8) {
    let s = symbol as usize;
    (TABLE.codes[s], CODE_LENGTHS[s])
}

/// Length in bytes of the Huffman encoding of `data`.
pub fn encoded_len(data: &[u8]) -> usize {
    let bits: usize = data.iter().map(|&b| CODE_LENGTHS[b as usize] as usize).sum();
    (bits + 7) / 8
}

/// Append the Huffman encoding of `data`, padded with 1 bits.
pub fn encode(data: &[u8], out: &mut Vec<u8>) {
    let mut acc: u64 = 0;
    let mut bits: u32 = 0;
    for &b in data {
        let len = CODE_LENGTHS[b as usize] as u32;
        acc = (acc << len) | TABLE.codes[b as usize] as u64;
        bits += len;
        while bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits > 0 {
        let pad = 8 - bits;
        out.push(((acc << pad) as u8) | ((1u8 << pad) - 1));
    }
}

/// Decode a Huffman string, appending the symbols to `out`.
///
/// Fails if the EOS symbol appears in the input, or if the trailing bits
/// are not a run of fewer than eight 1s.
pub fn decode(data: &[u8], out: &mut Vec<u8>) -> Result<(), HpackError> {
    decode_bounded(data, out, usize::MAX)
}

/// [`decode`], failing once `out` would exceed `limit` bytes.
pub fn decode_bounded(data: &[u8], out: &mut Vec<u8>, limit: usize) -> Result<(), HpackError> {
    let mut code: u32 = 0;
    let mut len: usize = 0;

    for &byte in data {
        for shift in (0..8).rev() {
            code = (code << 1) | ((byte >> shift) & 1) as u32;
            len += 1;
            if len > MAX_CODE_LEN {
                return Err(HpackError::InvalidPadding);
            }
            let offset = code.wrapping_sub(TABLE.first_code[len]);
            if code >= TABLE.first_code[len] && offset < TABLE.count[len] as u32 {
                let sym = TABLE.symbols[TABLE.first_index[len] as usize + offset as usize];
                if sym == EOS {
                    return Err(HpackError::EosInString);
                }
                if out.len() >= limit {
                    return Err(HpackError::StringTooLong { max: limit });
                }
                out.push(sym as u8);
                code = 0;
                len = 0;
            }
        }
    }

    if len >= 8 || code != (1u32 << len) - 1 {
        return Err(HpackError::InvalidPadding);
    }
    Ok(())
}
