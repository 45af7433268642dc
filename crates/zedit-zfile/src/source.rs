//! Where entry bytes come from.
//!
//! An entry's data is never held directly; it is described by an
//! [`EntrySource`] that can be opened as many times as needed. Entries read
//! from an archive point into the backing file, new entries hold their bytes
//! in memory, and decompressing or compressing views wrap another source.

use std::cell::RefCell;
use std::fmt;
use std::io::{Cursor, Read};
use std::rc::Rc;

use flate2::read::DeflateDecoder;

use crate::storage::ArchiveFile;
use crate::Result;

/// A re-openable byte source.
pub trait EntrySource: fmt::Debug {
    /// Open a fresh reader over the whole content.
    fn open(&self) -> Result<Box<dyn Read + '_>>;

    /// Number of bytes `open` yields.
    fn size(&self) -> u64;

    /// For decompressing views, the compressed source they read from.
    fn inner_compressed(&self) -> Option<Rc<dyn EntrySource>> {
        None
    }

    /// Read the whole content into memory.
    fn read_all(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size() as usize);
        self.open()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Bytes held in memory.
#[derive(Clone)]
pub struct BytesSource(Rc<[u8]>);

impl BytesSource {
    pub fn new(data: impl Into<Rc<[u8]>>) -> Self {
        Self(data.into())
    }
}

impl fmt::Debug for BytesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BytesSource({} bytes)", self.0.len())
    }
}

impl EntrySource for BytesSource {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(&self.0[..])))
    }

    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_vec())
    }
}

/// A byte range of the archive file.
pub struct FileRangeSource {
    file: Rc<RefCell<ArchiveFile>>,
    start: u64,
    end: u64,
}

impl FileRangeSource {
    pub fn new(file: Rc<RefCell<ArchiveFile>>, start: u64, end: u64) -> Self {
        assert!(start <= end, "range start {start} after end {end}");
        Self { file, start, end }
    }
}

impl fmt::Debug for FileRangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRangeSource[{} - {})", self.start, self.end)
    }
}

impl EntrySource for FileRangeSource {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.read_all()?)))
    }

    fn size(&self) -> u64 {
        self.end - self.start
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.size() as usize];
        self.file.borrow_mut().read_exact_at(self.start, &mut buf)?;
        Ok(buf)
    }
}

/// Decompressing view over deflated bytes.
#[derive(Debug)]
pub struct InflaterSource {
    compressed: Rc<dyn EntrySource>,
    uncompressed_size: u64,
}

impl InflaterSource {
    pub fn new(compressed: Rc<dyn EntrySource>, uncompressed_size: u64) -> Self {
        Self {
            compressed,
            uncompressed_size,
        }
    }
}

impl EntrySource for InflaterSource {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(DeflateDecoder::new(self.compressed.open()?)))
    }

    fn size(&self) -> u64 {
        self.uncompressed_size
    }

    fn inner_compressed(&self) -> Option<Rc<dyn EntrySource>> {
        Some(Rc::clone(&self.compressed))
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        let compressed = self.compressed.read_all()?;
        crate::compress::inflate(&compressed, self.uncompressed_size as usize)
    }
}

/// In-memory content with its compressed form.
///
/// `open` yields the uncompressed bytes; the compressed bytes are what gets
/// written to the archive.
#[derive(Debug)]
pub struct DeflatedSource {
    uncompressed: BytesSource,
    compressed: Rc<dyn EntrySource>,
}

impl DeflatedSource {
    pub fn new(uncompressed: BytesSource, compressed: Vec<u8>) -> Self {
        Self {
            uncompressed,
            compressed: Rc::new(BytesSource::new(compressed)),
        }
    }
}

impl EntrySource for DeflatedSource {
    fn open(&self) -> Result<Box<dyn Read + '_>> {
        self.uncompressed.open()
    }

    fn size(&self) -> u64 {
        self.uncompressed.size()
    }

    fn inner_compressed(&self) -> Option<Rc<dyn EntrySource>> {
        Some(Rc::clone(&self.compressed))
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        self.uncompressed.read_all()
    }
}
