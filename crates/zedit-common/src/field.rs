//! Fixed-offset record fields.
//!
//! ZIP records are sequences of little-endian unsigned integers at fixed
//! offsets. A [`ZipField`] describes one of them: where it lives, how wide it
//! is, what it is called, and which values it may hold. Records are read and
//! written through their fields so every value crossing the boundary is
//! validated the same way.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Width of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// Two bytes.
    U16,
    /// Four bytes.
    U32,
}

impl FieldWidth {
    /// Number of bytes the field occupies.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Largest value representable in this width.
    #[inline]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
        }
    }
}

/// A constraint every value of a field must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInvariant {
    /// The value must be strictly lower than the bound.
    Below(u64),
    /// Only the bits in the mask may be set.
    AllowedBits(u64),
}

impl FieldInvariant {
    /// Check whether `value` satisfies this invariant.
    #[inline]
    pub fn holds(&self, value: u64) -> bool {
        match *self {
            Self::Below(bound) => value < bound,
            Self::AllowedBits(mask) => value & !mask == 0,
        }
    }
}

impl fmt::Display for FieldInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Below(bound) => write!(f, "value < {bound}"),
            Self::AllowedBits(mask) => write!(f, "only bits {mask:#x} set"),
        }
    }
}

/// A little-endian unsigned field at a fixed offset inside a record.
///
/// Fields are meant to be declared as constants next to the record they
/// describe:
///
/// ```
/// use zedit_common::{FieldInvariant, ZipField};
///
/// const SIGNATURE: ZipField = ZipField::u32(0, "signature").expect_value(0x06054b50);
/// const DISK: ZipField = ZipField::u16(4, "disk number").expect_value(0);
/// const RECORDS: ZipField = ZipField::u16(6, "records")
///     .with_invariants(&[FieldInvariant::Below(100)]);
///
/// let mut record = [0u8; 8];
/// SIGNATURE.write_expected(&mut record).unwrap();
/// DISK.write_expected(&mut record).unwrap();
/// RECORDS.write(&mut record, 3).unwrap();
///
/// SIGNATURE.verify_expected(&record).unwrap();
/// assert_eq!(RECORDS.read(&record).unwrap(), 3);
/// assert!(RECORDS.write(&mut record, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ZipField {
    name: &'static str,
    offset: usize,
    width: FieldWidth,
    expected: Option<u64>,
    invariants: &'static [FieldInvariant],
}

impl ZipField {
    /// Declare a two-byte field.
    pub const fn u16(offset: usize, name: &'static str) -> Self {
        Self {
            name,
            offset,
            width: FieldWidth::U16,
            expected: None,
            invariants: &[],
        }
    }

    /// Declare a four-byte field.
    pub const fn u32(offset: usize, name: &'static str) -> Self {
        Self {
            name,
            offset,
            width: FieldWidth::U32,
            expected: None,
            invariants: &[],
        }
    }

    /// Give the field a fixed expected value.
    pub const fn expect_value(self, value: u64) -> Self {
        Self {
            expected: Some(value),
            ..self
        }
    }

    /// Attach invariants checked on every read and write.
    pub const fn with_invariants(self, invariants: &'static [FieldInvariant]) -> Self {
        Self { invariants, ..self }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub const fn width(&self) -> FieldWidth {
        self.width
    }

    #[inline]
    pub const fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Offset of the first byte after the field.
    #[inline]
    pub const fn end_offset(&self) -> usize {
        self.offset + self.width.bytes()
    }

    fn check_invariants(&self, value: u64) -> Result<()> {
        match self.invariants.iter().find(|inv| !inv.holds(value)) {
            Some(inv) => Err(Error::FieldInvariant {
                field: self.name,
                value,
                constraint: inv.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn bytes<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        let end = self.end_offset();
        if record.len() < end {
            return Err(Error::UnexpectedEof {
                needed: end,
                available: record.len(),
            });
        }
        Ok(&record[self.offset..end])
    }

    /// Read the field out of `record`.
    pub fn read(&self, record: &[u8]) -> Result<u64> {
        let bytes = self.bytes(record)?;
        let value = match self.width {
            FieldWidth::U16 => LittleEndian::read_u16(bytes) as u64,
            FieldWidth::U32 => LittleEndian::read_u32(bytes) as u64,
        };
        self.check_invariants(value)?;
        Ok(value)
    }

    /// Read the field and check that it holds `expected`.
    pub fn verify(&self, record: &[u8], expected: u64) -> Result<()> {
        self.check_invariants(expected)?;
        let actual = self.read(record)?;
        if actual != expected {
            return Err(Error::FieldMismatch {
                field: self.name,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Read the field and check that it holds its declared fixed value.
    ///
    /// # Panics
    ///
    /// Panics if the field has no fixed value.
    pub fn verify_expected(&self, record: &[u8]) -> Result<()> {
        let Some(expected) = self.expected else {
            panic!("field '{}' has no expected value", self.name);
        };
        self.verify(record, expected)
    }

    /// Check that the field is present in `record` without interpreting it.
    pub fn skip(&self, record: &[u8]) -> Result<()> {
        self.bytes(record).map(|_| ())
    }

    /// Write `value` into the field's slot in `record`.
    ///
    /// # Panics
    ///
    /// Panics if `record` is too short to hold the field.
    pub fn write(&self, record: &mut [u8], value: u64) -> Result<()> {
        self.check_invariants(value)?;
        if value > self.width.max_value() {
            return Err(Error::FieldOverflow {
                field: self.name,
                value,
            });
        }

        let end = self.end_offset();
        assert!(
            record.len() >= end,
            "record of {} bytes cannot hold field '{}' ending at {}",
            record.len(),
            self.name,
            end
        );

        let slot = &mut record[self.offset..end];
        match self.width {
            FieldWidth::U16 => LittleEndian::write_u16(slot, value as u16),
            FieldWidth::U32 => LittleEndian::write_u32(slot, value as u32),
        }
        Ok(())
    }

    /// Write the field's declared fixed value.
    ///
    /// # Panics
    ///
    /// Panics if the field has no fixed value.
    pub fn write_expected(&self, record: &mut [u8]) -> Result<()> {
        let Some(expected) = self.expected else {
            panic!("field '{}' has no expected value", self.name);
        };
        self.write(record, expected)
    }
}
