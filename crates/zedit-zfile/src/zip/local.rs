//! Local File Header and data descriptor records.

use byteorder::{ByteOrder, LittleEndian};
use zedit_common::ZipField;

use super::DosDateTime;
use crate::header::CentralDirectoryHeader;
use crate::{Error, Result};

/// Local File Header signature as u32.
pub const SIGNATURE: u32 = 0x04034b50;

/// Size of the fixed part of a Local File Header.
pub const FIXED_SIZE: usize = 30;

/// Data descriptor signature as u32.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

const F_SIGNATURE: ZipField = ZipField::u32(0, "Signature").expect_value(SIGNATURE as u64);
const F_VERSION_EXTRACT: ZipField = ZipField::u16(4, "Version to extract");
const F_GP_BIT: ZipField = ZipField::u16(6, "GP bit flag");
const F_METHOD: ZipField = ZipField::u16(8, "Method");
const F_LAST_MOD_TIME: ZipField = ZipField::u16(10, "Last modification time");
const F_LAST_MOD_DATE: ZipField = ZipField::u16(12, "Last modification date");
const F_CRC32: ZipField = ZipField::u32(14, "CRC32");
const F_COMPRESSED_SIZE: ZipField = ZipField::u32(18, "Compressed size");
const F_UNCOMPRESSED_SIZE: ZipField = ZipField::u32(22, "Uncompressed size");
const F_FILE_NAME_LENGTH: ZipField = ZipField::u16(26, "File name length");
const F_EXTRA_LENGTH: ZipField = ZipField::u16(28, "Extra length");

/// How an entry's data descriptor is laid out, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataDescriptorType {
    /// CRC and sizes are in the headers.
    #[default]
    None,
    /// Descriptor starts with its signature: 16 bytes.
    WithSignature,
    /// Descriptor without signature: 12 bytes.
    WithoutSignature,
}

impl DataDescriptorType {
    /// Bytes the descriptor occupies after the entry data.
    #[inline]
    pub const fn size(self) -> u64 {
        match self {
            Self::None => 0,
            Self::WithSignature => 16,
            Self::WithoutSignature => 12,
        }
    }
}

/// Serialize the local header of `header`, name and extra field included.
///
/// With `no_timestamps` the time and date are written as zero.
pub(crate) fn write_header(
    header: &CentralDirectoryHeader,
    local_extra: &[u8],
    no_timestamps: bool,
) -> Result<Vec<u8>> {
    let modified = if no_timestamps {
        DosDateTime::ZERO
    } else {
        header.modified
    };

    let mut out = vec![0u8; FIXED_SIZE];
    F_SIGNATURE.write_expected(&mut out)?;
    F_VERSION_EXTRACT.write(&mut out, header.version_extract.into())?;
    F_GP_BIT.write(&mut out, header.flags.bits().into())?;
    F_METHOD.write(&mut out, header.method.code().into())?;
    F_LAST_MOD_TIME.write(&mut out, modified.time.into())?;
    F_LAST_MOD_DATE.write(&mut out, modified.date.into())?;
    F_CRC32.write(&mut out, header.crc32.into())?;
    F_COMPRESSED_SIZE.write(&mut out, header.compressed_size)?;
    F_UNCOMPRESSED_SIZE.write(&mut out, header.uncompressed_size)?;
    F_FILE_NAME_LENGTH.write(&mut out, header.encoded_name.len() as u64)?;
    F_EXTRA_LENGTH.write(&mut out, local_extra.len() as u64)?;

    out.extend_from_slice(&header.encoded_name);
    out.extend_from_slice(local_extra);
    Ok(out)
}

/// Lengths of the variable part of a local header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VariableLengths {
    pub name: usize,
    pub extra: usize,
}

/// Check the fixed part of a local header against its central directory
/// record.
///
/// Timestamps are not compared when `ignore_timestamps` is set. CRC and sizes
/// are not compared for entries with a data descriptor, since the local
/// header is allowed to carry zeros there.
pub(crate) fn verify_header(
    fixed: &[u8],
    header: &CentralDirectoryHeader,
    ignore_timestamps: bool,
) -> Result<VariableLengths> {
    let check = || -> zedit_common::Result<VariableLengths> {
        F_SIGNATURE.verify_expected(fixed)?;
        F_VERSION_EXTRACT.verify(fixed, header.version_extract.into())?;
        F_GP_BIT.verify(fixed, header.flags.bits().into())?;
        F_METHOD.verify(fixed, header.method.code().into())?;

        if ignore_timestamps {
            F_LAST_MOD_TIME.skip(fixed)?;
            F_LAST_MOD_DATE.skip(fixed)?;
        } else {
            F_LAST_MOD_TIME.verify(fixed, header.modified.time.into())?;
            F_LAST_MOD_DATE.verify(fixed, header.modified.date.into())?;
        }

        if header.flags.is_deferred_crc() {
            F_CRC32.skip(fixed)?;
            F_COMPRESSED_SIZE.skip(fixed)?;
            F_UNCOMPRESSED_SIZE.skip(fixed)?;
        } else {
            F_CRC32.verify(fixed, header.crc32.into())?;
            F_COMPRESSED_SIZE.verify(fixed, header.compressed_size)?;
            F_UNCOMPRESSED_SIZE.verify(fixed, header.uncompressed_size)?;
        }

        F_FILE_NAME_LENGTH.verify(fixed, header.encoded_name.len() as u64)?;
        let extra = F_EXTRA_LENGTH.read(fixed)? as usize;

        Ok(VariableLengths {
            name: header.encoded_name.len(),
            extra,
        })
    };

    check().map_err(|source| Error::LocalHeaderMismatch {
        entry: header.name.clone(),
        source,
    })
}

/// Check the data descriptor at the start of `data` against the central
/// directory record and report its layout.
///
/// `data` must hold at least the 12 bytes of a descriptor without signature.
pub(crate) fn verify_data_descriptor(
    data: &[u8],
    header: &CentralDirectoryHeader,
) -> Result<DataDescriptorType> {
    let short = |needed: usize| {
        Error::Corrupt(format!(
            "data descriptor of '{}' needs {needed} bytes, only {} available",
            header.name,
            data.len()
        ))
    };

    if data.len() < 12 {
        return Err(short(12));
    }

    let (kind, values) = if LittleEndian::read_u32(data) == DATA_DESCRIPTOR_SIGNATURE {
        if data.len() < 16 {
            return Err(short(16));
        }
        (DataDescriptorType::WithSignature, &data[4..16])
    } else {
        (DataDescriptorType::WithoutSignature, &data[..12])
    };

    let crc32 = LittleEndian::read_u32(&values[0..4]);
    let compressed = LittleEndian::read_u32(&values[4..8]) as u64;
    let uncompressed = LittleEndian::read_u32(&values[8..12]) as u64;

    if crc32 != header.crc32
        || compressed != header.compressed_size
        || uncompressed != header.uncompressed_size
    {
        return Err(Error::Corrupt(format!(
            "data descriptor of '{}' does not match the central directory",
            header.name
        )));
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{CompressionMethod, GpFlags};

    fn header() -> CentralDirectoryHeader {
        CentralDirectoryHeader::new(
            "a.txt",
            CompressionMethod::Store,
            0x12345678,
            5,
            5,
            DosDateTime { time: 10, date: 40 },
        )
    }

    #[test]
    fn test_header_layout() {
        let bytes = write_header(&header(), b"xy", false).unwrap();
        assert_eq!(bytes.len(), FIXED_SIZE + 5 + 2);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x03, 0x04]);
        assert_eq!(&bytes[30..35], b"a.txt");
        assert_eq!(&bytes[35..], b"xy");

        let lengths = verify_header(&bytes, &header(), false).unwrap();
        assert_eq!(lengths, VariableLengths { name: 5, extra: 2 });
    }

    #[test]
    fn test_timestamp_mismatch() {
        let bytes = write_header(&header(), &[], true).unwrap();
        assert_eq!(&bytes[10..14], &[0, 0, 0, 0]);

        assert!(matches!(
            verify_header(&bytes, &header(), false),
            Err(Error::LocalHeaderMismatch { .. })
        ));
        assert!(verify_header(&bytes, &header(), true).is_ok());
    }

    #[test]
    fn test_deferred_crc_skips_sizes() {
        let mut deferred = header();
        deferred.flags = GpFlags::parse(GpFlags::DEFERRED_CRC).unwrap();
        let mut bytes = write_header(&deferred, &[], false).unwrap();
        bytes[14..26].fill(0);

        assert!(verify_header(&bytes, &deferred, false).is_ok());
        assert!(verify_header(&bytes, &header(), false).is_err());
    }

    #[test]
    fn test_data_descriptor_layouts() {
        let mut with_sig = Vec::new();
        with_sig.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        with_sig.extend_from_slice(&0x12345678u32.to_le_bytes());
        with_sig.extend_from_slice(&5u32.to_le_bytes());
        with_sig.extend_from_slice(&5u32.to_le_bytes());

        assert_eq!(
            verify_data_descriptor(&with_sig, &header()).unwrap(),
            DataDescriptorType::WithSignature
        );
        assert_eq!(
            verify_data_descriptor(&with_sig[4..], &header()).unwrap(),
            DataDescriptorType::WithoutSignature
        );
        assert_eq!(DataDescriptorType::WithSignature.size(), 16);
        assert_eq!(DataDescriptorType::WithoutSignature.size(), 12);

        with_sig[8] ^= 1;
        assert!(verify_data_descriptor(&with_sig, &header()).is_err());
    }
}
