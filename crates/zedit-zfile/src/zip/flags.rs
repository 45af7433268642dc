//! General purpose bit flags.

use crate::{Error, Result};

/// The general purpose bit field of an entry.
///
/// Only the UTF-8 name bit, the deferred CRC bit and the deflate option bits
/// are supported; anything else is rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpFlags(u16);

impl GpFlags {
    /// Entry is encrypted.
    pub const ENCRYPTION: u16 = 1 << 0;
    /// Compression method options (deflate level hint).
    pub const METHOD_OPTIONS: u16 = 0b110;
    /// CRC and sizes follow the data in a data descriptor.
    pub const DEFERRED_CRC: u16 = 1 << 3;
    /// Enhanced deflating.
    pub const ENHANCED_DEFLATE: u16 = 1 << 4;
    /// Compressed patched data.
    pub const PATCHED: u16 = 1 << 5;
    /// Strong encryption.
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    /// Name and comment are UTF-8 (language encoding flag).
    pub const UTF8: u16 = 1 << 11;

    const SUPPORTED: u16 = Self::METHOD_OPTIONS | Self::DEFERRED_CRC | Self::UTF8;

    /// Flags for a new entry.
    pub const fn new(utf8: bool) -> Self {
        if utf8 {
            Self(Self::UTF8)
        } else {
            Self(0)
        }
    }

    /// Validate flags read from an archive.
    pub fn parse(bits: u16) -> Result<Self> {
        let unsupported = bits & !Self::SUPPORTED;
        if unsupported != 0 {
            return Err(Error::UnsupportedFlags(unsupported));
        }
        Ok(Self(bits))
    }

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_utf8(self) -> bool {
        self.0 & Self::UTF8 != 0
    }

    #[inline]
    pub const fn is_deferred_crc(self) -> bool {
        self.0 & Self::DEFERRED_CRC != 0
    }

    /// The compression method option bits.
    #[inline]
    pub const fn method_options(self) -> u16 {
        self.0 & Self::METHOD_OPTIONS
    }

    /// The same flags without the deferred CRC bit.
    #[inline]
    pub const fn without_deferred_crc(self) -> Self {
        Self(self.0 & !Self::DEFERRED_CRC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_bits() {
        let flags = GpFlags::parse(GpFlags::UTF8 | GpFlags::DEFERRED_CRC).unwrap();
        assert!(flags.is_utf8());
        assert!(flags.is_deferred_crc());
        assert!(!flags.without_deferred_crc().is_deferred_crc());
        assert!(flags.without_deferred_crc().is_utf8());
    }

    #[test]
    fn test_unsupported_bits_rejected() {
        for bits in [
            GpFlags::ENCRYPTION,
            GpFlags::ENHANCED_DEFLATE,
            GpFlags::PATCHED,
            GpFlags::STRONG_ENCRYPTION,
            1 << 13,
            1 << 15,
        ] {
            assert!(
                matches!(GpFlags::parse(bits), Err(Error::UnsupportedFlags(b)) if b == bits),
                "bits {bits:#x} accepted"
            );
        }
    }

    #[test]
    fn test_new() {
        assert_eq!(GpFlags::new(false).bits(), 0);
        assert_eq!(GpFlags::new(true).bits(), 0x0800);
    }
}
