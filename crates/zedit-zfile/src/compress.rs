//! Compression of entry data.

use std::fmt;
use std::io::{Read, Write};
use std::rc::Rc;

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::options::DEFAULT_COMPRESSION_LEVEL;
use crate::source::{BytesSource, DeflatedSource, EntrySource};
use crate::zip::CompressionMethod;
use crate::{Error, Result};

/// Outcome of compressing an entry.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// Method the data ended up stored with.
    pub method: CompressionMethod,
    /// Uncompressed view of the data; for deflated results its inner
    /// compressed source holds the bytes to write.
    pub source: Rc<dyn EntrySource>,
    /// Number of bytes that will be written to the archive.
    pub stored_size: u64,
}

/// Turns uncompressed data into what gets written to an archive.
pub trait Compressor: fmt::Debug {
    fn compress(&self, data: Vec<u8>) -> Result<CompressionResult>;
}

/// Raw DEFLATE compressor that falls back to storing when deflating does
/// not make the data smaller.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: u32,
}

impl DeflateCompressor {
    /// Create a compressor for a DEFLATE level between 0 and 9.
    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel(level));
        }
        Ok(Self { level })
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Deflate `data` without zlib framing.
    pub fn deflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, data: Vec<u8>) -> Result<CompressionResult> {
        let compressed = self.deflate(&data)?;
        let uncompressed = BytesSource::new(data);

        if compressed.len() as u64 >= uncompressed.size() {
            return Ok(CompressionResult {
                method: CompressionMethod::Store,
                stored_size: uncompressed.size(),
                source: Rc::new(uncompressed),
            });
        }

        Ok(CompressionResult {
            method: CompressionMethod::Deflate,
            stored_size: compressed.len() as u64,
            source: Rc::new(DeflatedSource::new(uncompressed, compressed)),
        })
    }
}

/// Inflate raw DEFLATE data with known output size.
pub fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut output = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if output.len() != expected_size {
        return Err(Error::Decompression(format!(
            "expected {expected_size} bytes, inflated {}",
            output.len()
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_roundtrip() {
        let original = b"Hello, World! This is a test of DEFLATE compression.".repeat(10);
        let compressor = DeflateCompressor::default();

        let result = compressor.compress(original.clone()).unwrap();
        assert_eq!(result.method, CompressionMethod::Deflate);
        assert!(result.stored_size < original.len() as u64);

        let raw = result.source.inner_compressed().unwrap().read_all().unwrap();
        assert_eq!(raw.len() as u64, result.stored_size);
        assert_eq!(inflate(&raw, original.len()).unwrap(), original);
        assert_eq!(result.source.read_all().unwrap(), original);
    }

    #[test]
    fn test_incompressible_data_is_stored() {
        let result = DeflateCompressor::new(9).unwrap().compress(vec![7]).unwrap();
        assert_eq!(result.method, CompressionMethod::Store);
        assert_eq!(result.stored_size, 1);
        assert!(result.source.inner_compressed().is_none());
    }

    #[test]
    fn test_level_out_of_range() {
        assert_eq!(DeflateCompressor::new(0).unwrap().level(), 0);
        assert!(matches!(
            DeflateCompressor::new(10),
            Err(Error::InvalidCompressionLevel(10))
        ));
    }

    #[test]
    fn test_inflate_size_mismatch() {
        let compressed = DeflateCompressor::default().deflate(b"abc").unwrap();
        assert!(matches!(
            inflate(&compressed, 4),
            Err(Error::Decompression(_))
        ));
    }
}
