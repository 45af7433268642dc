//! End of Central Directory (EOCD) record.

use zedit_common::ZipField;

use crate::{Error, Result};

const F_SIGNATURE: ZipField =
    ZipField::u32(0, "EOCD signature").expect_value(Eocd::SIGNATURE as u64);
const F_NUMBER_OF_DISK: ZipField = ZipField::u16(4, "Number of this disk").expect_value(0);
const F_DISK_CD_START: ZipField = ZipField::u16(6, "Disk where CD starts").expect_value(0);
const F_RECORDS_DISK: ZipField = ZipField::u16(8, "Record count on disk");
const F_RECORDS_TOTAL: ZipField = ZipField::u16(10, "Total records");
const F_CD_SIZE: ZipField = ZipField::u32(12, "Directory size");
const F_CD_OFFSET: ZipField = ZipField::u32(16, "Directory offset");
const F_COMMENT_SIZE: ZipField = ZipField::u16(20, "Comment size");

/// End of Central Directory record.
///
/// The record is immutable; its serialized form is computed when it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eocd {
    total_records: u64,
    directory_offset: u64,
    directory_size: u64,
    comment: Vec<u8>,
    bytes: Vec<u8>,
}

impl Eocd {
    /// EOCD signature as u32.
    pub const SIGNATURE: u32 = 0x06054b50;

    /// EOCD signature bytes.
    pub const MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

    /// Size of the record without a comment.
    pub const MIN_SIZE: usize = 22;

    /// Build a record describing a central directory.
    pub fn new(
        total_records: u64,
        directory_offset: u64,
        directory_size: u64,
        comment: Vec<u8>,
    ) -> Result<Self> {
        let mut bytes = vec![0u8; Self::MIN_SIZE];
        F_SIGNATURE.write_expected(&mut bytes)?;
        F_NUMBER_OF_DISK.write_expected(&mut bytes)?;
        F_DISK_CD_START.write_expected(&mut bytes)?;
        F_RECORDS_DISK.write(&mut bytes, total_records)?;
        F_RECORDS_TOTAL.write(&mut bytes, total_records)?;
        F_CD_SIZE.write(&mut bytes, directory_size)?;
        F_CD_OFFSET.write(&mut bytes, directory_offset)?;
        F_COMMENT_SIZE.write(&mut bytes, comment.len() as u64)?;
        bytes.extend_from_slice(&comment);

        Ok(Self {
            total_records,
            directory_offset,
            directory_size,
            comment,
            bytes,
        })
    }

    /// Parse a record starting at the beginning of `data`.
    ///
    /// `data` may extend past the record; only the record and its comment
    /// are consumed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::Corrupt(format!(
                "EOCD needs {} bytes, only {} available",
                Self::MIN_SIZE,
                data.len()
            )));
        }

        let signature = F_SIGNATURE.read(data)? as u32;
        if signature != Self::SIGNATURE {
            return Err(Error::InvalidSignature {
                expected: Self::SIGNATURE,
                actual: signature,
            });
        }
        if F_NUMBER_OF_DISK.read(data)? != 0 {
            return Err(Error::MultiVolume("EOCD disk number is not zero"));
        }
        if F_DISK_CD_START.read(data)? != 0 {
            return Err(Error::MultiVolume("central directory starts on another disk"));
        }

        let records_on_disk = F_RECORDS_DISK.read(data)?;
        let total_records = F_RECORDS_TOTAL.read(data)?;
        if records_on_disk != total_records {
            return Err(Error::MultiVolume("records are split across disks"));
        }

        let directory_size = F_CD_SIZE.read(data)?;
        let directory_offset = F_CD_OFFSET.read(data)?;
        let comment_size = F_COMMENT_SIZE.read(data)? as usize;

        let end = Self::MIN_SIZE + comment_size;
        if data.len() < end {
            return Err(Error::Corrupt(format!(
                "EOCD comment has {comment_size} bytes but only {} are available",
                data.len() - Self::MIN_SIZE
            )));
        }

        Ok(Self {
            total_records,
            directory_offset,
            directory_size,
            comment: data[Self::MIN_SIZE..end].to_vec(),
            bytes: data[..end].to_vec(),
        })
    }

    /// Number of central directory records.
    #[inline]
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    #[inline]
    pub fn directory_offset(&self) -> u64 {
        self.directory_offset
    }

    #[inline]
    pub fn directory_size(&self) -> u64 {
        self.directory_size
    }

    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Size of the serialized record, comment included.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The serialized record.
    #[inline]
    pub fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_parse() {
        let eocd = Eocd::new(3, 1000, 150, b"hi".to_vec()).unwrap();
        assert_eq!(eocd.size(), 24);
        assert_eq!(&eocd.to_bytes()[..4], &Eocd::MAGIC);

        let parsed = Eocd::parse(eocd.to_bytes()).unwrap();
        assert_eq!(parsed, eocd);
        assert_eq!(parsed.total_records(), 3);
        assert_eq!(parsed.directory_offset(), 1000);
        assert_eq!(parsed.directory_size(), 150);
        assert_eq!(parsed.comment(), b"hi");
    }

    #[test]
    fn test_empty_archive_record() {
        let eocd = Eocd::new(0, 0, 0, Vec::new()).unwrap();
        let mut expected = vec![0u8; 22];
        expected[..4].copy_from_slice(&Eocd::MAGIC);
        assert_eq!(eocd.to_bytes(), &expected[..]);
    }

    #[test]
    fn test_nonzero_disk_rejected() {
        let mut bytes = Eocd::new(1, 0, 46, Vec::new()).unwrap().to_bytes().to_vec();
        bytes[4] = 1;
        assert!(matches!(Eocd::parse(&bytes), Err(Error::MultiVolume(_))));
    }

    #[test]
    fn test_truncated_comment() {
        let mut bytes = Eocd::new(0, 0, 0, b"abc".to_vec()).unwrap().to_bytes().to_vec();
        bytes.truncate(23);
        assert!(matches!(Eocd::parse(&bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_too_many_records() {
        assert!(Eocd::new(70_000, 0, 0, Vec::new()).is_err());
    }
}
