//! Growable per-connection byte buffer.
//!
//! Bytes are appended at the write position and drained from the front.
//! Capacity doubles on demand and never shrinks.

use std::io::{self, Read};

use crate::error::{ProxyError, Result};

/// Byte buffer owned by a single connection.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    len: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Buffered bytes, front first.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Read once from `reader` into the unused tail.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let n = reader.read(&mut self.data[self.len..])?;
        self.len += n;
        Ok(n)
    }

    /// Append bytes, doubling capacity as often as needed.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let needed = self.len + bytes.len();
        if needed > self.data.len() {
            let mut capacity = self.data.len().max(1);
            while capacity < needed {
                capacity <<= 1;
            }
            self.data.resize(capacity, 0);
        }
        self.data[self.len..needed].copy_from_slice(bytes);
        self.len = needed;
    }

    /// Double the capacity, keeping content and write position.
    ///
    /// Fails once the buffer already holds `limit` bytes of capacity.
    pub fn grow(&mut self, limit: usize) -> Result<usize> {
        let capacity = self.data.len();
        if capacity >= limit {
            return Err(ProxyError::BufferLimit { limit });
        }
        let grown = (capacity.max(1) << 1).min(limit);
        self.data.resize(grown, 0);
        Ok(grown)
    }

    /// Drop `n` bytes from the front, moving the unsent remainder forward.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
