//! Per-entry central directory metadata.

use std::time::SystemTime;

use crate::zip::encoding;
use crate::zip::{
    CompressionMethod, DosDateTime, GpFlags, VERSION_DEFLATE_OR_DIRECTORY, VERSION_STORED,
};

/// Metadata of one archive entry, as recorded in the central directory.
///
/// A header whose [`offset`](Self::offset) is `None` describes an entry that
/// has not been written to the file yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub(crate) name: String,
    pub(crate) encoded_name: Vec<u8>,
    pub(crate) made_by: u16,
    pub(crate) version_extract: u16,
    pub(crate) flags: GpFlags,
    pub(crate) method: CompressionMethod,
    pub(crate) modified: DosDateTime,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) extra: Vec<u8>,
    pub(crate) comment: Vec<u8>,
    pub(crate) internal_attributes: u16,
    pub(crate) external_attributes: u32,
    pub(crate) offset: Option<u64>,
}

impl CentralDirectoryHeader {
    /// Create the header of an entry that is not yet in the file.
    pub(crate) fn new(
        name: &str,
        method: CompressionMethod,
        crc32: u32,
        uncompressed_size: u64,
        compressed_size: u64,
        modified: DosDateTime,
    ) -> Self {
        let (flags, encoded_name) = encoding::encode(name);
        let version_extract = if name.ends_with('/') || method == CompressionMethod::Deflate {
            VERSION_DEFLATE_OR_DIRECTORY
        } else {
            VERSION_STORED
        };

        Self {
            name: name.to_owned(),
            encoded_name,
            made_by: 0,
            version_extract,
            flags,
            method,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            extra: Vec::new(),
            comment: Vec::new(),
            internal_attributes: 0,
            external_attributes: 0,
            offset: None,
        }
    }

    /// Get the entry name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the name exactly as stored in the records.
    #[inline]
    pub fn encoded_name(&self) -> &[u8] {
        &self.encoded_name
    }

    #[inline]
    pub fn made_by(&self) -> u16 {
        self.made_by
    }

    #[inline]
    pub fn version_extract(&self) -> u16 {
        self.version_extract
    }

    #[inline]
    pub fn flags(&self) -> GpFlags {
        self.flags
    }

    #[inline]
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Packed modification time and date.
    #[inline]
    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Get the last modification time as a SystemTime.
    ///
    /// Returns None if the DOS timestamp is invalid (e.g. zeroed).
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified.to_system_time()
    }

    /// CRC-32 of the uncompressed data.
    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    #[inline]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    #[inline]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    #[inline]
    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    #[inline]
    pub fn internal_attributes(&self) -> u16 {
        self.internal_attributes
    }

    #[inline]
    pub fn external_attributes(&self) -> u32 {
        self.external_attributes
    }

    /// Offset of the entry's local header, `None` if not yet written.
    #[inline]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Whether the name denotes a directory.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    #[inline]
    pub(crate) fn set_offset(&mut self, offset: Option<u64>) {
        self.offset = offset;
    }

    /// Copy of this header for an entry that will be written from scratch:
    /// no offset and no data descriptor.
    pub fn clone_unwritten(&self) -> Self {
        Self {
            offset: None,
            flags: self.flags.without_deferred_crc(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_to_extract() {
        let stored = CentralDirectoryHeader::new(
            "a.txt",
            CompressionMethod::Store,
            0,
            0,
            0,
            DosDateTime::ZERO,
        );
        assert_eq!(stored.version_extract(), 10);

        let deflated = CentralDirectoryHeader::new(
            "a.txt",
            CompressionMethod::Deflate,
            0,
            0,
            0,
            DosDateTime::ZERO,
        );
        assert_eq!(deflated.version_extract(), 20);

        let dir =
            CentralDirectoryHeader::new("a/", CompressionMethod::Store, 0, 0, 0, DosDateTime::ZERO);
        assert_eq!(dir.version_extract(), 20);
        assert!(dir.is_directory());
    }

    #[test]
    fn test_clone_unwritten_resets_offset_and_descriptor() {
        let mut header = CentralDirectoryHeader::new(
            "x",
            CompressionMethod::Store,
            7,
            3,
            3,
            DosDateTime::ZERO,
        );
        header.offset = Some(400);
        header.flags = GpFlags::parse(GpFlags::DEFERRED_CRC).unwrap();

        let clone = header.clone_unwritten();
        assert_eq!(clone.offset(), None);
        assert!(!clone.flags().is_deferred_crc());
        assert_eq!(clone.crc32(), 7);
        assert_eq!(clone.name(), "x");
    }
}
