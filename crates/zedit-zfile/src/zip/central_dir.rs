//! Central Directory File Header records.

use zedit_common::{BinaryReader, FieldInvariant, ZipField};

use super::encoding;
use super::{CompressionMethod, DosDateTime, GpFlags, MAX_VERSION_TO_EXTRACT};
use crate::header::CentralDirectoryHeader;
use crate::{Error, Result};

/// Central Directory signature as u32.
pub const SIGNATURE: u32 = 0x02014b50;

/// Size of the fixed part of a record.
pub const FIXED_SIZE: usize = 46;

/// Internal attribute bit marking a text file; the only one allowed.
const ASCII_BIT: u64 = 1;

const F_SIGNATURE: ZipField = ZipField::u32(0, "Signature").expect_value(SIGNATURE as u64);
const F_MADE_BY: ZipField = ZipField::u16(4, "Made by");
const F_VERSION_EXTRACT: ZipField = ZipField::u16(6, "Version to extract");
const F_GP_BIT: ZipField = ZipField::u16(8, "GP bit flag");
const F_METHOD: ZipField = ZipField::u16(10, "Method");
const F_LAST_MOD_TIME: ZipField = ZipField::u16(12, "Last modification time");
const F_LAST_MOD_DATE: ZipField = ZipField::u16(14, "Last modification date");
const F_CRC32: ZipField = ZipField::u32(16, "CRC32");
const F_COMPRESSED_SIZE: ZipField = ZipField::u32(20, "Compressed size");
const F_UNCOMPRESSED_SIZE: ZipField = ZipField::u32(24, "Uncompressed size");
const F_FILE_NAME_LENGTH: ZipField = ZipField::u16(28, "File name length");
const F_EXTRA_FIELD_LENGTH: ZipField = ZipField::u16(30, "Extra field length");
const F_COMMENT_LENGTH: ZipField = ZipField::u16(32, "Comment length");
const F_DISK_NUMBER_START: ZipField = ZipField::u16(34, "Disk start").expect_value(0);
const F_INTERNAL_ATTRIBUTES: ZipField = ZipField::u16(36, "Int attributes")
    .with_invariants(&[FieldInvariant::AllowedBits(ASCII_BIT)]);
const F_EXTERNAL_ATTRIBUTES: ZipField = ZipField::u32(38, "Ext attributes");
const F_OFFSET: ZipField = ZipField::u32(42, "Offset");

/// Read one record from `reader`.
pub(crate) fn read_record(reader: &mut BinaryReader<'_>) -> Result<CentralDirectoryHeader> {
    let fixed = reader.read_bytes(FIXED_SIZE)?;

    let signature = F_SIGNATURE.read(fixed)? as u32;
    if signature != SIGNATURE {
        return Err(Error::InvalidSignature {
            expected: SIGNATURE,
            actual: signature,
        });
    }

    let made_by = F_MADE_BY.read(fixed)? as u16;
    let version_extract = F_VERSION_EXTRACT.read(fixed)? as u16;
    if version_extract > MAX_VERSION_TO_EXTRACT {
        return Err(Error::UnsupportedVersion(version_extract));
    }

    let flags = GpFlags::parse(F_GP_BIT.read(fixed)? as u16)?;
    let method_code = F_METHOD.read(fixed)? as u16;
    let method =
        CompressionMethod::try_from(method_code).map_err(Error::UnsupportedCompression)?;
    if method == CompressionMethod::Store && flags.method_options() != 0 {
        return Err(Error::UnsupportedFlags(flags.method_options()));
    }

    let modified = DosDateTime {
        time: F_LAST_MOD_TIME.read(fixed)? as u16,
        date: F_LAST_MOD_DATE.read(fixed)? as u16,
    };
    let crc32 = F_CRC32.read(fixed)? as u32;
    let compressed_size = F_COMPRESSED_SIZE.read(fixed)?;
    let uncompressed_size = F_UNCOMPRESSED_SIZE.read(fixed)?;
    let name_length = F_FILE_NAME_LENGTH.read(fixed)? as usize;
    let extra_length = F_EXTRA_FIELD_LENGTH.read(fixed)? as usize;
    let comment_length = F_COMMENT_LENGTH.read(fixed)? as usize;

    if F_DISK_NUMBER_START.read(fixed)? != 0 {
        return Err(Error::MultiVolume("entry starts on another disk"));
    }

    let internal_attributes = F_INTERNAL_ATTRIBUTES.read(fixed)? as u16;
    let external_attributes = F_EXTERNAL_ATTRIBUTES.read(fixed)? as u32;
    let offset = F_OFFSET.read(fixed)?;

    let encoded_name = reader.read_bytes(name_length)?.to_vec();
    let extra = reader.read_bytes(extra_length)?.to_vec();
    let comment = reader.read_bytes(comment_length)?.to_vec();

    Ok(CentralDirectoryHeader {
        name: encoding::decode(&encoded_name, flags),
        encoded_name,
        made_by,
        version_extract,
        flags,
        method,
        modified,
        crc32,
        compressed_size,
        uncompressed_size,
        extra,
        comment,
        internal_attributes,
        external_attributes,
        offset: Some(offset),
    })
}

/// Append the record for `header` to `out`.
///
/// # Panics
///
/// Panics if the header has not been written to the file yet.
pub(crate) fn write_record(header: &CentralDirectoryHeader, out: &mut Vec<u8>) -> Result<()> {
    let Some(offset) = header.offset else {
        panic!("entry '{}' has no offset", header.name);
    };

    let mut fixed = [0u8; FIXED_SIZE];
    F_SIGNATURE.write_expected(&mut fixed)?;
    F_MADE_BY.write(&mut fixed, header.made_by.into())?;
    F_VERSION_EXTRACT.write(&mut fixed, header.version_extract.into())?;
    F_GP_BIT.write(&mut fixed, header.flags.bits().into())?;
    F_METHOD.write(&mut fixed, header.method.code().into())?;
    F_LAST_MOD_TIME.write(&mut fixed, header.modified.time.into())?;
    F_LAST_MOD_DATE.write(&mut fixed, header.modified.date.into())?;
    F_CRC32.write(&mut fixed, header.crc32.into())?;
    F_COMPRESSED_SIZE.write(&mut fixed, header.compressed_size)?;
    F_UNCOMPRESSED_SIZE.write(&mut fixed, header.uncompressed_size)?;
    F_FILE_NAME_LENGTH.write(&mut fixed, header.encoded_name.len() as u64)?;
    F_EXTRA_FIELD_LENGTH.write(&mut fixed, header.extra.len() as u64)?;
    F_COMMENT_LENGTH.write(&mut fixed, header.comment.len() as u64)?;
    F_DISK_NUMBER_START.write_expected(&mut fixed)?;
    F_INTERNAL_ATTRIBUTES.write(&mut fixed, header.internal_attributes.into())?;
    F_EXTERNAL_ATTRIBUTES.write(&mut fixed, header.external_attributes.into())?;
    F_OFFSET.write(&mut fixed, offset)?;

    out.extend_from_slice(&fixed);
    out.extend_from_slice(&header.encoded_name);
    out.extend_from_slice(&header.extra);
    out.extend_from_slice(&header.comment);
    Ok(())
}
