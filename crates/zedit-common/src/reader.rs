//! Binary reader for walking byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! consecutive records out of a byte slice without copying.

use crate::{Error, Result};

/// A bounds-checked cursor over a byte slice.
///
/// Reads never panic: running past the end of the buffer yields
/// [`Error::UnexpectedEof`].
///
/// # Example
///
/// ```
/// use zedit_common::BinaryReader;
///
/// let data = b"name\x01\x02";
/// let mut reader = BinaryReader::new(data);
///
/// assert_eq!(reader.read_bytes(4).unwrap(), b"name");
/// assert_eq!(reader.remaining(), 2);
/// assert!(reader.read_bytes(3).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes_slices_in_order() {
        let data = b"abcdef";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_bytes(2).unwrap(), b"ab");
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.read_bytes(4).unwrap(), b"cdef");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        match reader.read_bytes(4) {
            Err(Error::UnexpectedEof { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected EOF, got {other:?}"),
        }
        assert_eq!(reader.remaining(), 2);
    }
}
