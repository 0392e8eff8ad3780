//! HPACK indexing tables (RFC 7541 Section 2.3).
//!
//! Index 1..=61 addresses the static table; 62 and up addresses the dynamic
//! table, newest entry first.

use std::collections::VecDeque;

use crate::error::HpackError;

/// Per-entry accounting overhead (RFC 7541 Section 4.1).
pub const ENTRY_OVERHEAD: usize = 32;

/// RFC 7541 Appendix A, indexed 1..=61.
pub const STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// Result of searching the combined index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Name and value both match; the field can be sent as an index.
    Full(u32),
    /// Only the name matches.
    Name(u32),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Absolute offset of the name in the insertion stream.
    start: usize,
    name_len: usize,
    value_len: usize,
}

impl Entry {
    fn size(&self) -> usize {
        self.name_len + self.value_len + ENTRY_OVERHEAD
    }
}

/// The HPACK dynamic table.
///
/// Names and values live back to back in one byte buffer, oldest first, so
/// eviction drops bytes from the front and insertion appends. `entries`
/// is ordered newest first to match HPACK indexing. A max size of 0
/// disables the table: every insert leaves it empty.
#[derive(Debug)]
pub struct DynamicTable {
    bytes: Vec<u8>,
    entries: VecDeque<Entry>,
    /// Bytes dropped from the front of `bytes` so far.
    evicted: usize,
    actual_size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            bytes: Vec::with_capacity(max_size),
            entries: VecDeque::with_capacity(max_size / ENTRY_OVERHEAD),
            evicted: 0,
            actual_size: 0,
            max_size,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of entry sizes, including the 32-byte overhead of each.
    pub fn size(&self) -> usize {
        self.actual_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entry by 0-based dynamic index (0 = newest).
    pub fn get(&self, index: usize) -> Option<(&[u8], &[u8])> {
        let e = self.entries.get(index)?;
        let at = e.start - self.evicted;
        let name = &self.bytes[at..at + e.name_len];
        let value = &self.bytes[at + e.name_len..at + e.name_len + e.value_len];
        Some((name, value))
    }

    pub fn insert(&mut self, name: &[u8], value: &[u8]) {
        let size = name.len() + value.len() + ENTRY_OVERHEAD;
        if size > self.max_size {
            // RFC 7541 Section 4.4: an oversize entry empties the table.
            self.clear();
            return;
        }
        self.evict_to(self.max_size - size);

        let start = self.evicted + self.bytes.len();
        self.bytes.extend_from_slice(name);
        self.bytes.extend_from_slice(value);
        self.entries.push_front(Entry {
            start,
            name_len: name.len(),
            value_len: value.len(),
        });
        self.actual_size += size;
    }

    /// Change the maximum size, evicting until the table fits.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to(max_size);
    }

    pub fn clear(&mut self) {
        self.evicted += self.bytes.len();
        self.bytes.clear();
        self.entries.clear();
        self.actual_size = 0;
    }

    fn evict_to(&mut self, target: usize) {
        let mut dropped = 0;
        while self.actual_size > target {
            let Some(oldest) = self.entries.pop_back() else {
                break;
            };
            self.actual_size -= oldest.size();
            dropped += oldest.name_len + oldest.value_len;
        }
        if dropped > 0 {
            self.bytes.copy_within(dropped.., 0);
            self.bytes.truncate(self.bytes.len() - dropped);
            self.evicted += dropped;
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        (0..self.entries.len()).filter_map(move |i| self.get(i))
    }
}

/// Resolve a combined HPACK index to a (name, value) pair.
pub fn lookup(dynamic: &DynamicTable, index: u32) -> Result<(&[u8], &[u8]), HpackError> {
    let i = index as usize;
    match i {
        0 => Err(HpackError::InvalidIndex(index)),
        1..=61 => Ok(STATIC_TABLE[i - 1]),
        _ => dynamic.get(i - 62).ok_or(HpackError::InvalidIndex(index)),
    }
}

/// Search both tables for `name`/`value`, preferring a full match.
pub fn find(dynamic: &DynamicTable, name: &[u8], value: &[u8]) -> Option<Match> {
    let mut name_match = None;

    for (i, (n, v)) in STATIC_TABLE.iter().enumerate() {
        if *n == name {
            if *v == value {
                return Some(Match::Full(i as u32 + 1));
            }
            name_match.get_or_insert(i as u32 + 1);
        }
    }

    for (i, (n, v)) in dynamic.iter().enumerate() {
        if n == name {
            if v == value {
                return Some(Match::Full(i as u32 + 62));
            }
            name_match.get_or_insert(i as u32 + 62);
        }
    }

    name_match.map(Match::Name)
}
