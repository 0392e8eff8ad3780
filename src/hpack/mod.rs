//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Header block encoder and decoder built on the integer, Huffman and table
//! primitives in the submodules. Each side keeps its own dynamic table for
//! the lifetime of a connection.

pub mod huffman;
pub mod integer;
pub mod table;

use crate::error::{HeaderListError, HpackError};
use crate::headers::HeaderList;

use integer::{decode_integer, encode_integer};
use table::{DynamicTable, Match, ENTRY_OVERHEAD};

/// Default SETTINGS_HEADER_TABLE_SIZE.
pub const DEFAULT_TABLE_SIZE: usize = 4096;

/// Longest name or value a decoder built with [`HpackDecoder::new`] accepts.
pub const DEFAULT_STRING_CAPACITY: usize = 4096;

/// An owned HTTP/2 header, used at the embedding API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Header {
    pub name: String,
    pub value: String,
}

impl H2Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HPACK decoder for HTTP/2 header blocks.
pub struct HpackDecoder {
    table: DynamicTable,
    /// Upper bound for size updates: our SETTINGS_HEADER_TABLE_SIZE.
    max_table_size: usize,
    max_integer: u32,
    /// Scratch space for one literal, preallocated and never grown.
    name: Vec<u8>,
    value: Vec<u8>,
    string_capacity: usize,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder")
            .field("table_entries", &self.table.len())
            .field("table_size", &self.table.size())
            .field("max_table_size", &self.max_table_size)
            .finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE, u32::MAX >> 1)
    }
}

impl HpackDecoder {
    /// `max_integer` bounds every decoded integer (indices, lengths, sizes).
    pub fn new(max_table_size: usize, max_integer: u32) -> Self {
        Self::with_string_capacity(max_table_size, max_integer, DEFAULT_STRING_CAPACITY)
    }

    /// Like [`new`](Self::new), with room for names and values of up to
    /// `string_capacity` bytes. Longer literals are rejected.
    pub fn with_string_capacity(max_table_size: usize, max_integer: u32, string_capacity: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_size),
            max_table_size,
            max_integer,
            name: Vec::with_capacity(string_capacity),
            value: Vec::with_capacity(string_capacity),
            string_capacity,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Empty the table and restore the initial size bound.
    pub fn reset(&mut self, max_table_size: usize) {
        self.table.clear();
        self.table.set_max_size(max_table_size);
        self.max_table_size = max_table_size;
    }

    /// Apply a new local SETTINGS_HEADER_TABLE_SIZE once the peer has
    /// acknowledged it.
    pub fn set_max_table_size(&mut self, max_table_size: usize) {
        self.max_table_size = max_table_size;
        if self.table.max_size() > max_table_size {
            self.table.set_max_size(max_table_size);
        }
    }

    /// Decode a complete header block into `out`. Repeated names are merged
    /// by the header list.
    pub fn decode_into(&mut self, block: &[u8], out: &mut HeaderList) -> Result<(), HpackError> {
        self.decode_with(block, |name, value| {
            out.add(name, value).map_err(|e| match e {
                HeaderListError::NulByte => HpackError::InvalidHeaderByte,
                e @ HeaderListError::NoSpace => HpackError::HeaderList(e),
            })
        })
    }

    /// Decode a complete header block into an ordered list of headers.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<H2Header>, HpackError> {
        let mut headers = Vec::new();
        self.decode_with(block, |name, value| {
            headers.push(H2Header::new(
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            ));
            Ok(())
        })?;
        Ok(headers)
    }

    fn decode_with<F>(&mut self, block: &[u8], mut emit: F) -> Result<(), HpackError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), HpackError>,
    {
        let mut pos = 0;
        let mut field_seen = false;

        while pos < block.len() {
            let first = block[pos];

            if first & 0x80 != 0 {
                // Indexed header field (Section 6.1): 1xxxxxxx
                let (index, n) = decode_integer(&block[pos..], 7, self.max_integer)?;
                pos += n;
                let (name, value) = table::lookup(&self.table, index)?;
                emit(name, value)?;
                field_seen = true;
            } else if first & 0x40 != 0 {
                // Literal with incremental indexing (Section 6.2.1): 01xxxxxx
                pos += self.decode_literal(&block[pos..], 6)?;
                emit(&self.name, &self.value)?;
                self.table.insert(&self.name, &self.value);
                field_seen = true;
            } else if first & 0x20 != 0 {
                // Dynamic table size update (Section 6.3): 001xxxxx
                if field_seen {
                    return Err(HpackError::LateTableSizeUpdate);
                }
                let (size, n) = decode_integer(&block[pos..], 5, self.max_integer)?;
                pos += n;
                if size as usize > self.max_table_size {
                    return Err(HpackError::TableSizeAboveLimit {
                        requested: size,
                        max: self.max_table_size as u32,
                    });
                }
                self.table.set_max_size(size as usize);
            } else {
                // Literal never indexed (0001xxxx) or without indexing (0000xxxx)
                pos += self.decode_literal(&block[pos..], 4)?;
                emit(&self.name, &self.value)?;
                field_seen = true;
            }
        }

        Ok(())
    }

    /// Decode a literal representation into the `name`/`value` scratch
    /// buffers and return the bytes read.
    fn decode_literal(&mut self, buf: &[u8], prefix_bits: u8) -> Result<usize, HpackError> {
        let (index, mut pos) = decode_integer(buf, prefix_bits, self.max_integer)?;
        self.name.clear();
        self.value.clear();
        let limit = self.string_capacity;
        if index == 0 {
            pos += decode_string(&buf[pos..], self.max_integer, limit, &mut self.name)?;
        } else {
            let (name, _) = table::lookup(&self.table, index)?;
            if name.len() > limit {
                return Err(HpackError::StringTooLong { max: limit });
            }
            self.name.extend_from_slice(name);
        }
        pos += decode_string(&buf[pos..], self.max_integer, limit, &mut self.value)?;
        Ok(pos)
    }
}

/// Decode one string literal into `out`, which must stay within `limit`
/// bytes.
fn decode_string(buf: &[u8], max_integer: u32, limit: usize, out: &mut Vec<u8>) -> Result<usize, HpackError> {
    let huffman_coded = buf.first().ok_or(HpackError::Truncated)? & 0x80 != 0;
    let (len, n) = decode_integer(buf, 7, max_integer)?;
    let end = n + len as usize;
    let data = buf.get(n..end).ok_or(HpackError::Truncated)?;
    if huffman_coded {
        huffman::decode_bounded(data, out, limit)?;
    } else {
        if data.len() > limit {
            return Err(HpackError::StringTooLong { max: limit });
        }
        out.extend_from_slice(data);
    }
    Ok(end)
}

fn encode_string(data: &[u8], out: &mut Vec<u8>) {
    let huffman_len = huffman::encoded_len(data);
    if huffman_len < data.len() {
        encode_integer(huffman_len as u32, 7, 0x80, out);
        huffman::encode(data, out);
    } else {
        encode_integer(data.len() as u32, 7, 0x00, out);
        out.extend_from_slice(data);
    }
}

/// HPACK encoder for HTTP/2 header blocks.
///
/// Exact static or dynamic matches are sent as indexed fields. Anything
/// else is sent as a literal with incremental indexing, naming the header
/// by index when the name is known, unless the entry could never fit in
/// the table, in which case it is sent without indexing.
pub struct HpackEncoder {
    table: DynamicTable,
    /// Our own ceiling for the table size.
    limit: usize,
    /// Smallest and final size since the last block, owed to the decoder.
    pending_update: Option<(usize, usize)>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder")
            .field("table_entries", &self.table.len())
            .field("table_size", &self.table.size())
            .field("limit", &self.limit)
            .finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_SIZE)
    }
}

impl HpackEncoder {
    /// `limit` caps the table regardless of what the peer allows.
    pub fn new(limit: usize) -> Self {
        let size = limit.min(DEFAULT_TABLE_SIZE);
        let pending_update = (size != DEFAULT_TABLE_SIZE).then_some((size, size));
        Self {
            table: DynamicTable::new(size),
            limit,
            pending_update,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Forget all indexing state, as if newly created.
    pub fn reset(&mut self) {
        let size = self.limit.min(DEFAULT_TABLE_SIZE);
        self.table.clear();
        self.table.set_max_size(size);
        self.pending_update = (size != DEFAULT_TABLE_SIZE).then_some((size, size));
    }

    /// React to the peer's SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_peer_table_size(&mut self, peer_size: usize) {
        let size = peer_size.min(self.limit);
        if size == self.table.max_size() {
            return;
        }
        self.table.set_max_size(size);
        let min = match self.pending_update {
            Some((min, _)) => min.min(size),
            None => size,
        };
        self.pending_update = Some((min, size));
    }

    /// Compress every pair of `headers` into `out` as one header block.
    pub fn encode_into(&mut self, headers: &HeaderList, out: &mut Vec<u8>) {
        self.begin_block(out);
        for (name, value) in headers.all() {
            self.encode_field(name, value, out);
        }
    }

    /// Encode headers into an HPACK header block.
    pub fn encode(&mut self, headers: &[H2Header]) -> Vec<u8> {
        let mut out = Vec::new();
        self.begin_block(&mut out);
        for h in headers {
            self.encode_field(h.name.as_bytes(), h.value.as_bytes(), &mut out);
        }
        out
    }

    fn begin_block(&mut self, out: &mut Vec<u8>) {
        if let Some((min, size)) = self.pending_update.take() {
            if min < size {
                encode_integer(min as u32, 5, 0x20, out);
            }
            encode_integer(size as u32, 5, 0x20, out);
        }
    }

    fn encode_field(&mut self, name: &[u8], value: &[u8], out: &mut Vec<u8>) {
        let indexable = name.len() + value.len() + ENTRY_OVERHEAD <= self.table.max_size();

        match table::find(&self.table, name, value) {
            Some(Match::Full(index)) => encode_integer(index, 7, 0x80, out),
            Some(Match::Name(index)) if indexable => {
                encode_integer(index, 6, 0x40, out);
                encode_string(value, out);
                self.table.insert(name, value);
            }
            Some(Match::Name(index)) => {
                encode_integer(index, 4, 0x00, out);
                encode_string(value, out);
            }
            None if indexable => {
                out.push(0x40);
                encode_string(name, out);
                encode_string(value, out);
                self.table.insert(name, value);
            }
            None => {
                out.push(0x00);
                encode_string(name, out);
                encode_string(value, out);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
