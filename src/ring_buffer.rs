//! Fixed-capacity FIFO byte storage.
//!
//! Backs the read and write side of every connection. The storage is
//! allocated once at construction and never grows; a write that does not
//! fit is rejected whole so frames are never half-queued.

use crate::error::RingBufferError;

pub struct RingBuffer {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space in bytes.
    pub fn available(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Append all of `data`, or nothing if it does not fit.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RingBufferError> {
        if data.len() > self.available() {
            return Err(RingBufferError::Full {
                needed: data.len(),
                available: self.available(),
            });
        }
        self.write_unchecked(data);
        Ok(())
    }

    /// Append as much of `data` as fits and return the count.
    pub fn write_partial(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available());
        self.write_unchecked(&data[..n]);
        n
    }

    fn write_unchecked(&mut self, data: &[u8]) {
        let cap = self.buf.len();
        if cap == 0 || data.is_empty() {
            return;
        }
        let tail = (self.head + self.len) % cap;
        let first = data.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&data[first..]);
        }
        self.len += data.len();
    }

    /// The buffered bytes as two slices in FIFO order. The second slice is
    /// empty unless the data wraps around the end of the storage.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let cap = self.buf.len();
        if self.len == 0 {
            return (&[], &[]);
        }
        let end = self.head + self.len;
        if end <= cap {
            (&self.buf[self.head..end], &[])
        } else {
            (&self.buf[self.head..], &self.buf[..end - cap])
        }
    }

    /// Rotate the storage so all buffered bytes are contiguous and return them.
    pub fn make_contiguous(&mut self) -> &[u8] {
        if self.head + self.len > self.buf.len() {
            self.buf.rotate_left(self.head);
            self.head = 0;
        }
        &self.buf[self.head..self.head + self.len]
    }

    /// Copy up to `out.len()` bytes without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let (a, b) = self.as_slices();
        let n = out.len().min(self.len);
        let first = n.min(a.len());
        out[..first].copy_from_slice(&a[..first]);
        if n > first {
            out[first..n].copy_from_slice(&b[..n - first]);
        }
        n
    }

    /// Copy up to `out.len()` bytes out and consume them.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.consume(n);
        n
    }

    /// Drop `n` bytes from the front. Clamped to the buffered length.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        if n == 0 {
            return;
        }
        self.head = (self.head + n) % self.buf.len();
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.buf.len())
            .field("len", &self.len)
            .finish()
    }
}
