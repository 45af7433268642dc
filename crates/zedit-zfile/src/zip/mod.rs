//! ZIP format structures.
//!
//! This module contains the low-level record layouts the archive engine reads
//! and writes: the end of central directory record, central directory file
//! headers, local file headers and data descriptors, plus the small value
//! types they carry (compression method, general purpose flags, DOS times).

pub(crate) mod central_dir;
pub(crate) mod encoding;
mod eocd;
mod flags;
pub(crate) mod local;
mod msdos;

pub use eocd::Eocd;
pub use flags::GpFlags;
pub use local::DataDescriptorType;
pub use msdos::DosDateTime;

/// Compression methods supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// Raw DEFLATE compression.
    Deflate = 8,
}

impl CompressionMethod {
    /// The method's code in ZIP records.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            other => Err(other),
        }
    }
}

/// Highest "version needed to extract" the engine understands (2.0).
pub const MAX_VERSION_TO_EXTRACT: u16 = 20;

/// Version needed to extract a stored file.
pub const VERSION_STORED: u16 = 10;

/// Version needed to extract a directory or deflated file.
pub const VERSION_DEFLATE_OR_DIRECTORY: u16 = 20;

/// Signature of the Zip64 end of central directory locator.
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Size of the Zip64 end of central directory locator.
pub const ZIP64_EOCD_LOCATOR_SIZE: usize = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method_codes() {
        assert_eq!(CompressionMethod::try_from(0), Ok(CompressionMethod::Store));
        assert_eq!(CompressionMethod::try_from(8), Ok(CompressionMethod::Deflate));
        assert_eq!(CompressionMethod::try_from(12), Err(12));
        assert_eq!(CompressionMethod::Deflate.code(), 8);
    }
}
