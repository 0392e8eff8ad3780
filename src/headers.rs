//! Compact storage for name/value header pairs.
//!
//! Pairs live in one flat buffer as `name\0value\0`, in insertion order.
//! The buffer is sized once; operations that would outgrow it fail with
//! [`HeaderListError::NoSpace`] and leave the list untouched.

use crate::error::HeaderListError;

pub struct HeaderList {
    buf: Vec<u8>,
    capacity: usize,
    count: usize,
}

/// Byte offsets of one stored pair.
struct Slot {
    name: usize,
    value: usize,
    /// Index of the value's terminating NUL.
    end: usize,
}

impl HeaderList {
    pub fn new(capacity: usize) -> Self {
        HeaderList {
            buf: Vec::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Number of pairs.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bytes in use, separators included.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.count = 0;
    }

    /// Add a pair. If `name` is already present (ASCII case-insensitive),
    /// `value` is appended to the existing value after a comma.
    pub fn add(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderListError> {
        check_bytes(name)?;
        check_bytes(value)?;

        if let Some(slot) = self.locate(name) {
            self.reserve(value.len() + 1)?;
            let tail = std::iter::once(b',').chain(value.iter().copied());
            self.buf.splice(slot.end..slot.end, tail);
            return Ok(());
        }

        self.append(name, value)
    }

    /// Set `name` to `value`, replacing any existing value.
    pub fn set(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderListError> {
        check_bytes(name)?;
        check_bytes(value)?;

        let Some(slot) = self.locate(name) else {
            return self.append(name, value);
        };

        let old_len = slot.end - slot.value;
        if value.len() <= old_len {
            self.buf.splice(slot.value..slot.end, value.iter().copied());
            return Ok(());
        }

        // Grows: drop the old pair and re-append at the end.
        let old_pair = slot.end + 1 - slot.name;
        let new_pair = name.len() + value.len() + 2;
        if self.buf.len() - old_pair + new_pair > self.capacity {
            return Err(HeaderListError::NoSpace);
        }
        self.buf.drain(slot.name..=slot.end);
        self.count -= 1;
        self.append(name, value)
    }

    /// Value stored for `name` (ASCII case-insensitive).
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.locate(name).map(|s| &self.buf[s.value..s.end])
    }

    /// All pairs in insertion order, borrowed from the list's storage.
    pub fn all(&self) -> Iter<'_> {
        Iter { rest: &self.buf }
    }

    fn append(&mut self, name: &[u8], value: &[u8]) -> Result<(), HeaderListError> {
        self.reserve(name.len() + value.len() + 2)?;
        self.buf.extend_from_slice(name);
        self.buf.push(0);
        self.buf.extend_from_slice(value);
        self.buf.push(0);
        self.count += 1;
        Ok(())
    }

    fn reserve(&self, n: usize) -> Result<(), HeaderListError> {
        if self.buf.len() + n > self.capacity {
            Err(HeaderListError::NoSpace)
        } else {
            Ok(())
        }
    }

    fn locate(&self, name: &[u8]) -> Option<Slot> {
        let mut pos = 0;
        while pos < self.buf.len() {
            let name_end = pos + self.buf[pos..].iter().position(|&b| b == 0)?;
            let value = name_end + 1;
            let end = value + self.buf[value..].iter().position(|&b| b == 0)?;
            if self.buf[pos..name_end].eq_ignore_ascii_case(name) {
                return Some(Slot {
                    name: pos,
                    value,
                    end,
                });
            }
            pos = end + 1;
        }
        None
    }
}

impl std::fmt::Debug for HeaderList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.all().map(|(n, v)| {
                (String::from_utf8_lossy(n), String::from_utf8_lossy(v))
            }))
            .finish()
    }
}

fn check_bytes(data: &[u8]) -> Result<(), HeaderListError> {
    if data.contains(&0) {
        Err(HeaderListError::NulByte)
    } else {
        Ok(())
    }
}

/// Iterator over the pairs of a [`HeaderList`].
pub struct Iter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let mut parts = self.rest.splitn(3, |&b| b == 0);
        let name = parts.next()?;
        let value = parts.next()?;
        self.rest = parts.next().unwrap_or(&[]);
        Some((name, value))
    }
}
