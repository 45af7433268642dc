//! The central directory as a whole.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use zedit_common::BinaryReader;

use crate::header::CentralDirectoryHeader;
use crate::zip::central_dir;
use crate::{Error, Result};

/// An immutable set of central directory records keyed by entry name.
///
/// The serialized form is computed on first use and cached.
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    headers: BTreeMap<String, CentralDirectoryHeader>,
    bytes: OnceCell<Vec<u8>>,
}

impl CentralDirectory {
    /// Parse `count` records that must exactly fill `data`.
    pub fn parse(data: &[u8], count: u64) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let mut headers = BTreeMap::new();

        for _ in 0..count {
            let header = central_dir::read_record(&mut reader)?;
            if headers.contains_key(header.name()) {
                return Err(Error::DuplicateEntry(header.name().to_owned()));
            }
            headers.insert(header.name().to_owned(), header);
        }

        if !reader.is_empty() {
            return Err(Error::Corrupt(format!(
                "{} bytes left over after {count} central directory records",
                reader.remaining()
            )));
        }

        let bytes = OnceCell::new();
        let _ = bytes.set(data.to_vec());
        Ok(Self { headers, bytes })
    }

    /// Build a directory from written entries.
    ///
    /// # Panics
    ///
    /// Panics if two headers share a name or a header has no offset.
    pub fn from_headers<I>(headers: I) -> Self
    where
        I: IntoIterator<Item = CentralDirectoryHeader>,
    {
        let mut map = BTreeMap::new();
        for header in headers {
            assert!(
                header.offset().is_some(),
                "entry '{}' has not been written",
                header.name()
            );
            let name = header.name().to_owned();
            let previous = map.insert(name.clone(), header);
            assert!(previous.is_none(), "duplicate entry '{name}'");
        }

        Self {
            headers: map,
            bytes: OnceCell::new(),
        }
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Look up a record by entry name.
    pub fn get(&self, name: &str) -> Option<&CentralDirectoryHeader> {
        self.headers.get(name)
    }

    /// All records in name order.
    pub fn headers(&self) -> impl Iterator<Item = &CentralDirectoryHeader> {
        self.headers.values()
    }

    /// The serialized directory, records ordered by name.
    pub fn to_bytes(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.bytes.get() {
            return Ok(bytes);
        }

        let mut out = Vec::new();
        for header in self.headers.values() {
            central_dir::write_record(header, &mut out)?;
        }
        Ok(self.bytes.get_or_init(|| out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{CompressionMethod, DosDateTime};

    fn written(name: &str, offset: u64) -> CentralDirectoryHeader {
        let mut header =
            CentralDirectoryHeader::new(name, CompressionMethod::Store, 0, 1, 1, DosDateTime::ZERO);
        header.set_offset(Some(offset));
        header
    }

    #[test]
    fn test_serialized_in_name_order() {
        let dir = CentralDirectory::from_headers([written("b", 0), written("a", 100)]);
        let bytes = dir.to_bytes().unwrap().to_vec();
        assert_eq!(&bytes[46..47], b"a");

        let parsed = CentralDirectory::parse(&bytes, 2).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("a").unwrap().offset(), Some(100));
        assert_eq!(parsed.get("b").unwrap().offset(), Some(0));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut bytes = Vec::new();
        central_dir::write_record(&written("a", 0), &mut bytes).unwrap();
        central_dir::write_record(&written("a", 50), &mut bytes).unwrap();

        assert!(matches!(
            CentralDirectory::parse(&bytes, 2),
            Err(Error::DuplicateEntry(name)) if name == "a"
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Vec::new();
        central_dir::write_record(&written("a", 0), &mut bytes).unwrap();
        bytes.push(0);
        assert!(matches!(
            CentralDirectory::parse(&bytes, 1),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    #[should_panic(expected = "duplicate entry")]
    fn test_from_headers_duplicate_panics() {
        CentralDirectory::from_headers([written("a", 0), written("a", 10)]);
    }
}
