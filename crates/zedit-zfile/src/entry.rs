//! Archive entries.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::header::CentralDirectoryHeader;
use crate::source::{BytesSource, EntrySource, FileRangeSource, InflaterSource};
use crate::storage::ArchiveFile;
use crate::zip::{encoding, local, CompressionMethod, DataDescriptorType};
use crate::{Error, Result};

/// Kind of entry, derived from the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoredEntryType {
    File,
    /// Name ends with `/`; has no data.
    Directory,
}

/// An entry of a [`ZFile`](crate::ZFile): its central directory header and
/// a source for its data.
///
/// Values handed out by the archive are snapshots. An entry that has been
/// removed or replaced is marked deleted; only its header stays accessible.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    header: CentralDirectoryHeader,
    entry_type: StoredEntryType,
    local_extra: Vec<u8>,
    data_descriptor: DataDescriptorType,
    /// Uncompressed view of the data. For deflated entries its inner
    /// compressed source holds the bytes as stored.
    source: Rc<dyn EntrySource>,
    deleted: bool,
}

impl StoredEntry {
    /// Create an entry whose data is not in the archive file yet.
    ///
    /// # Panics
    ///
    /// Panics if the header already has an offset, if the source size does
    /// not match the header, or if a deflated header comes with a source
    /// that cannot provide compressed bytes.
    pub(crate) fn new(header: CentralDirectoryHeader, source: Rc<dyn EntrySource>) -> Self {
        assert!(
            header.offset().is_none(),
            "new entry '{}' already has an offset",
            header.name()
        );
        assert!(
            !header.flags().is_deferred_crc(),
            "new entry '{}' cannot defer its CRC",
            header.name()
        );

        let entry_type = entry_type_of(&header);
        if entry_type == StoredEntryType::Directory {
            assert_eq!(source.size(), 0, "directory '{}' has data", header.name());
        }

        let mut entry = Self {
            header,
            entry_type,
            local_extra: Vec::new(),
            data_descriptor: DataDescriptorType::None,
            source: Rc::new(BytesSource::new(Vec::new())),
            deleted: false,
        };
        entry.set_source(source);
        entry
    }

    /// Load an entry described by a central directory record, checking its
    /// local header (and data descriptor, if any) in `file`.
    pub(crate) fn from_zip(
        header: CentralDirectoryHeader,
        file: &Rc<RefCell<ArchiveFile>>,
        ignore_timestamps: bool,
    ) -> Result<Self> {
        let Some(offset) = header.offset() else {
            panic!("entry '{}' is not in the file", header.name());
        };

        let mut fixed = [0u8; local::FIXED_SIZE];
        file.borrow_mut().read_exact_at(offset, &mut fixed)?;
        let lengths = local::verify_header(&fixed, &header, ignore_timestamps)?;

        let mut variable = vec![0u8; lengths.name + lengths.extra];
        file.borrow_mut()
            .read_exact_at(offset + local::FIXED_SIZE as u64, &mut variable)?;

        let local_name = encoding::decode(&variable[..lengths.name], header.flags());
        if local_name != header.name() {
            return Err(Error::NameMismatch {
                central: header.name().to_owned(),
                local: local_name,
            });
        }
        let local_extra = variable[lengths.name..].to_vec();

        let entry_type = entry_type_of(&header);
        if entry_type == StoredEntryType::Directory {
            check_directory(&header)?;
        }

        let local_header_size = (local::FIXED_SIZE + variable.len()) as u64;
        let data_descriptor = if header.flags().is_deferred_crc() {
            let at = offset + local_header_size + header.compressed_size();
            let bytes = file.borrow_mut().read_at(at, 16)?;
            local::verify_data_descriptor(&bytes, &header)?
        } else {
            DataDescriptorType::None
        };

        let source = source_from_zip(file, &header, offset + local_header_size);
        Ok(Self {
            header,
            entry_type,
            local_extra,
            data_descriptor,
            source,
            deleted: false,
        })
    }

    /// Entry name.
    #[inline]
    pub fn name(&self) -> &str {
        self.header.name()
    }

    #[inline]
    pub fn header(&self) -> &CentralDirectoryHeader {
        &self.header
    }

    /// # Panics
    ///
    /// Panics if the entry has been deleted.
    pub fn entry_type(&self) -> StoredEntryType {
        self.verify_not_deleted();
        self.entry_type
    }

    #[inline]
    pub fn data_descriptor_type(&self) -> DataDescriptorType {
        self.data_descriptor
    }

    #[inline]
    pub fn local_extra(&self) -> &[u8] {
        &self.local_extra
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Size of the local header, name and local extra field included.
    pub fn local_header_size(&self) -> u64 {
        self.verify_not_deleted();
        (local::FIXED_SIZE + self.header.encoded_name().len() + self.local_extra.len()) as u64
    }

    /// Bytes the entry occupies in the file: local header, data and data
    /// descriptor.
    pub fn in_file_size(&self) -> u64 {
        self.verify_not_deleted();
        self.local_header_size() + self.header.compressed_size() + self.data_descriptor.size()
    }

    /// Open a stream over the uncompressed data.
    pub fn open(&self) -> Result<Box<dyn Read + '_>> {
        self.verify_not_deleted();
        self.source.open()
    }

    /// Read the uncompressed data.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.verify_not_deleted();
        self.source.read_all()
    }

    /// Source of the uncompressed data.
    #[inline]
    pub fn source(&self) -> &Rc<dyn EntrySource> {
        &self.source
    }

    /// Source of the data exactly as stored in the archive.
    pub fn raw_source(&self) -> Rc<dyn EntrySource> {
        match self.header.method() {
            CompressionMethod::Store => Rc::clone(&self.source),
            CompressionMethod::Deflate => match self.source.inner_compressed() {
                Some(raw) => raw,
                None => unreachable!("deflated entry '{}' without raw source", self.name()),
            },
        }
    }

    /// Replace the data source.
    ///
    /// # Panics
    ///
    /// Panics if the source's size differs from the header's uncompressed
    /// size, or if the entry is deflated and the source has no compressed
    /// inner source.
    pub fn set_source(&mut self, source: Rc<dyn EntrySource>) {
        self.verify_not_deleted();
        assert_eq!(
            source.size(),
            self.header.uncompressed_size(),
            "source size does not match entry '{}'",
            self.name()
        );
        if self.header.method() == CompressionMethod::Deflate {
            assert!(
                source.inner_compressed().is_some(),
                "deflated entry '{}' needs a compressed source",
                self.name()
            );
        }
        self.source = source;
    }

    /// Point the entry at data just written at `offset` in `file`.
    pub(crate) fn replace_source_from_zip(&mut self, file: &Rc<RefCell<ArchiveFile>>, offset: u64) {
        self.verify_not_deleted();
        let data_start = offset + self.local_header_size();
        self.source = source_from_zip(file, &self.header, data_start);
        self.header.set_offset(Some(offset));
    }

    /// Detach the entry from the archive file by copying its data into
    /// memory. The entry will be written again on the next update, without a
    /// data descriptor.
    pub(crate) fn load_source_into_memory(&mut self) -> Result<()> {
        self.verify_not_deleted();
        if self.header.offset().is_none() {
            return Ok(());
        }

        let raw: Rc<dyn EntrySource> = Rc::new(BytesSource::new(self.raw_source().read_all()?));
        self.source = wrap_raw(raw, &self.header);
        self.header = self.header.clone_unwritten();
        self.data_descriptor = DataDescriptorType::None;
        Ok(())
    }

    /// Serialized local header.
    pub(crate) fn to_header_data(&self, no_timestamps: bool) -> Result<Vec<u8>> {
        self.verify_not_deleted();
        local::write_header(&self.header, &self.local_extra, no_timestamps)
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.verify_not_deleted();
        self.deleted = true;
    }

    fn verify_not_deleted(&self) {
        assert!(!self.deleted, "entry '{}' has been deleted", self.name());
    }
}

fn entry_type_of(header: &CentralDirectoryHeader) -> StoredEntryType {
    if header.is_directory() {
        StoredEntryType::Directory
    } else {
        StoredEntryType::File
    }
}

/// Directories carry no data. Some tools deflate the empty content into two
/// bytes, which is tolerated.
fn check_directory(header: &CentralDirectoryHeader) -> Result<()> {
    if header.crc32() != 0
        || header.uncompressed_size() != 0
        || !matches!(header.compressed_size(), 0 | 2)
    {
        return Err(Error::Corrupt(format!(
            "directory '{}' has data (crc {:#010x}, {} bytes, {} compressed)",
            header.name(),
            header.crc32(),
            header.uncompressed_size(),
            header.compressed_size()
        )));
    }
    Ok(())
}

/// Uncompressed view over raw stored bytes.
pub(crate) fn wrap_raw(raw: Rc<dyn EntrySource>, header: &CentralDirectoryHeader) -> Rc<dyn EntrySource> {
    match header.method() {
        CompressionMethod::Store => raw,
        CompressionMethod::Deflate => {
            Rc::new(InflaterSource::new(raw, header.uncompressed_size()))
        }
    }
}

fn source_from_zip(
    file: &Rc<RefCell<ArchiveFile>>,
    header: &CentralDirectoryHeader,
    data_start: u64,
) -> Rc<dyn EntrySource> {
    let raw = Rc::new(FileRangeSource::new(
        Rc::clone(file),
        data_start,
        data_start + header.compressed_size(),
    ));
    wrap_raw(raw, header)
}
