//! The editable archive.
//!
//! A [`ZFile`] keeps the layout of its backing file in a [`FileUseMap`]:
//! every entry, the central directory and the EOCD own a byte range, and
//! everything else is free. Edits only touch that map and the entry table;
//! the file itself is written by [`ZFile::update`], which fills the free
//! space left by removed entries and appends a fresh central directory.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::rc::Rc;

use log::{debug, trace, warn};
use memchr::memmem;
use walkdir::WalkDir;

use crate::compress::{Compressor, DeflateCompressor};
use crate::directory::CentralDirectory;
use crate::entry::{self, StoredEntry};
use crate::extension::{self, DeferredAction, ExtensionHandle, HookResult, ZFileExtension};
use crate::file_use_map::{FileUseMap, FileUseMapEntry};
use crate::header::CentralDirectoryHeader;
use crate::options::ZFileOptions;
use crate::source::{BytesSource, EntrySource};
use crate::storage::ArchiveFile;
use crate::zip::{
    CompressionMethod, DosDateTime, Eocd, ZIP64_EOCD_LOCATOR_SIGNATURE, ZIP64_EOCD_LOCATOR_SIZE,
};
use crate::{Error, Result};

/// Longest comment an EOCD can carry.
const MAX_EOCD_COMMENT_SIZE: usize = u16::MAX as usize;

/// How many times `entries_written` may be redelivered in one update.
pub const MAX_EXTENSION_CYCLES: usize = 10;

/// Chunk used when zeroing free space.
const ZERO_CHUNK: usize = 64 * 1024;

/// What occupies a used range of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Entry(String),
    CentralDirectory,
    Eocd,
}

#[derive(Debug)]
struct AllocatedEntry {
    block: FileUseMapEntry<Block>,
    entry: StoredEntry,
}

#[derive(Debug)]
struct PlacedDirectory {
    offset: u64,
    /// `None` when the directory is empty.
    block: Option<FileUseMapEntry<Block>>,
    directory: CentralDirectory,
}

impl PlacedDirectory {
    fn size(&self) -> u64 {
        self.block.as_ref().map_or(0, FileUseMapEntry::size)
    }
}

#[derive(Debug)]
struct PlacedEocd {
    block: FileUseMapEntry<Block>,
    eocd: Eocd,
}

/// A ZIP archive that can be edited in place.
///
/// Opening an existing file parses its EOCD and central directory and checks
/// every local header. Adding, deleting, merging and realigning entries
/// only change the in-memory layout; nothing is written until
/// [`update`](Self::update) or [`close`](Self::close). New entries go into
/// the best free space of the file, so an update rewrites only what changed
/// plus the central directory and EOCD at the end.
///
/// `ZFile` is single-threaded. Dropping a dirty archive loses its changes.
///
/// # Example
///
/// ```no_run
/// use zedit_zfile::{CompressionMethod, ZFile};
///
/// let mut zip = ZFile::open("app.zip")?;
/// zip.add_bytes("hello.txt", b"hello".to_vec(), CompressionMethod::Deflate)?;
/// zip.delete("old.txt")?;
/// zip.close()?;
/// # Ok::<(), zedit_zfile::Error>(())
/// ```
pub struct ZFile {
    file: Rc<RefCell<ArchiveFile>>,
    map: FileUseMap<Block>,
    entries: BTreeMap<String, AllocatedEntry>,
    directory: Option<PlacedDirectory>,
    eocd: Option<PlacedEocd>,
    eocd_comment: Vec<u8>,
    dirty: bool,
    extra_directory_offset: u64,
    extensions: Vec<ExtensionHandle>,
    pending: VecDeque<DeferredAction>,
    notifying: bool,
    options: ZFileOptions,
    compressor: Box<dyn Compressor>,
}

impl ZFile {
    /// Open an archive with default options, or prepare a new one if `path`
    /// does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ZFileOptions::default())
    }

    /// Open an archive, or prepare a new one if `path` does not exist.
    ///
    /// A new archive is dirty, so closing it creates an empty ZIP file.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ZFileOptions) -> Result<Self> {
        let path = path.as_ref();
        let compressor = Box::new(DeflateCompressor::new(options.compression_level)?);

        let mut zfile = Self {
            file: Rc::new(RefCell::new(ArchiveFile::new(path))),
            map: FileUseMap::new(0),
            entries: BTreeMap::new(),
            directory: None,
            eocd: None,
            eocd_comment: Vec::new(),
            dirty: false,
            extra_directory_offset: 0,
            extensions: Vec::new(),
            pending: VecDeque::new(),
            notifying: false,
            options,
            compressor,
        };

        if zfile.file.borrow().exists() {
            let len = {
                let mut file = zfile.file.borrow_mut();
                file.open_read_only()?;
                file.len()?
            };
            zfile.map.extend(len);
            zfile.read_data()?;
            debug!(
                "opened {} ({} entries, {len} bytes)",
                path.display(),
                zfile.entries.len()
            );
        } else {
            debug!("{} does not exist, starting an empty archive", path.display());
            zfile.dirty = true;
        }

        Ok(zfile)
    }

    /// Path of the backing file.
    pub fn path(&self) -> std::path::PathBuf {
        self.file.borrow().path().to_path_buf()
    }

    #[inline]
    pub fn options(&self) -> &ZFileOptions {
        &self.options
    }

    /// Whether local header timestamps are zeroed on write and skipped on
    /// read.
    #[inline]
    pub fn are_timestamps_ignored(&self) -> bool {
        self.options.no_timestamps
    }

    /// Whether there are changes not yet written.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the compressor used for new deflated entries.
    pub fn set_compressor(&mut self, compressor: Box<dyn Compressor>) {
        self.compressor = compressor;
    }

    /// Iterate over all entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &StoredEntry> + '_ {
        self.entries.values().map(|allocated| &allocated.entry)
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&StoredEntry> {
        self.entries.get(name).map(|allocated| &allocated.entry)
    }

    /// Read the uncompressed data of an entry.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_owned()))?
            .read()
    }

    /// Layout of the file as currently planned.
    pub fn file_use_map(&self) -> String {
        self.map.to_string()
    }

    // Reading

    fn read_data(&mut self) -> Result<()> {
        self.read_eocd()?;
        self.read_central_directory()?;

        let Some(placed) = &self.directory else {
            unreachable!("read an archive without central directory");
        };
        let directory_start = placed.offset;
        let headers: Vec<CentralDirectoryHeader> = placed.directory.headers().cloned().collect();

        let mut entries_end = 0;
        for header in headers {
            let Some(offset) = header.offset() else {
                unreachable!("parsed header '{}' has no offset", header.name());
            };
            let entry = StoredEntry::from_zip(header, &self.file, self.options.no_timestamps)?;
            let end = offset + entry.in_file_size();
            if !self.map.is_free_range(offset, end) {
                return Err(Error::Corrupt(format!(
                    "entry '{}' at [{offset}, {end}) overlaps other data",
                    entry.name()
                )));
            }

            let block = self.map.add(offset, end, Block::Entry(entry.name().to_owned()));
            trace!("entry '{}' at [{offset}, {end})", entry.name());
            entries_end = entries_end.max(end);
            self.entries
                .insert(entry.name().to_owned(), AllocatedEntry { block, entry });
        }

        // Reading the layout is not a change.
        self.extra_directory_offset = directory_start - entries_end;
        Ok(())
    }

    fn read_eocd(&mut self) -> Result<()> {
        let size = self.map.size();
        let window = (size as usize).min(MAX_EOCD_COMMENT_SIZE + Eocd::MIN_SIZE);
        if window < Eocd::MIN_SIZE {
            return Err(Error::EocdNotFound { searched: window });
        }

        let window_start = size - window as u64;
        let tail = self.file.borrow_mut().read_at(window_start, window)?;

        let mut found = None;
        let mut last_error = None;
        let haystack = &tail[..tail.len() - Eocd::MIN_SIZE + Eocd::MAGIC.len()];
        for position in memmem::rfind_iter(haystack, &Eocd::MAGIC) {
            match Eocd::parse(&tail[position..]) {
                Ok(eocd) if position + eocd.size() == tail.len() => {
                    found = Some((window_start + position as u64, eocd));
                    break;
                }
                Ok(eocd) => {
                    last_error = Some(Error::Corrupt(format!(
                        "EOCD at {} ends {} bytes before the end of the file",
                        window_start + position as u64,
                        tail.len() - position - eocd.size()
                    )));
                }
                Err(err) => last_error = Some(err),
            }
        }

        let Some((start, eocd)) = found else {
            return Err(last_error.unwrap_or(Error::EocdNotFound { searched: window }));
        };

        if start >= ZIP64_EOCD_LOCATOR_SIZE as u64 {
            let locator = self
                .file
                .borrow_mut()
                .read_at(start - ZIP64_EOCD_LOCATOR_SIZE as u64, 4)?;
            if locator == ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes() {
                return Err(Error::Zip64Unsupported);
            }
        }

        trace!("EOCD at {start}, {} records", eocd.total_records());
        let block = self.map.add(start, size, Block::Eocd);
        self.eocd_comment = eocd.comment().to_vec();
        self.eocd = Some(PlacedEocd { block, eocd });
        Ok(())
    }

    fn read_central_directory(&mut self) -> Result<()> {
        let Some(placed) = &self.eocd else {
            unreachable!("central directory read before EOCD");
        };
        let eocd_start = placed.block.start();
        let offset = placed.eocd.directory_offset();
        let size = placed.eocd.directory_size();
        let count = placed.eocd.total_records();

        if offset + size != eocd_start {
            return Err(Error::Corrupt(format!(
                "central directory [{offset}, {}) does not end at the EOCD ({eocd_start})",
                offset + size
            )));
        }

        let mut bytes = vec![0u8; size as usize];
        if size > 0 {
            self.file.borrow_mut().read_exact_at(offset, &mut bytes)?;
        }
        let directory = CentralDirectory::parse(&bytes, count)?;

        let block = (size > 0).then(|| self.map.add(offset, offset + size, Block::CentralDirectory));
        self.directory = Some(PlacedDirectory {
            offset,
            block,
            directory,
        });
        Ok(())
    }

    // Editing

    /// Add an entry with the content of `source`, replacing any entry of the
    /// same name.
    ///
    /// With [`CompressionMethod::Deflate`] the data is compressed right away
    /// and stored uncompressed if that is smaller. Names ending in `/` are
    /// directories and must have no data.
    pub fn add(
        &mut self,
        name: &str,
        source: &dyn EntrySource,
        method: CompressionMethod,
    ) -> Result<()> {
        self.add_data(name, source.read_all()?, method)
    }

    /// Add an entry from bytes in memory.
    pub fn add_bytes(
        &mut self,
        name: &str,
        data: impl Into<Vec<u8>>,
        method: CompressionMethod,
    ) -> Result<()> {
        self.add_data(name, data.into(), method)
    }

    /// Add an entry with everything `reader` yields.
    pub fn add_reader<R: Read>(
        &mut self,
        name: &str,
        mut reader: R,
        method: CompressionMethod,
    ) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.add_data(name, data, method)
    }

    /// Add an entry with the content of a file on disk.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
        method: CompressionMethod,
    ) -> Result<()> {
        let data = std::fs::read(path)?;
        self.add_data(name, data, method)
    }

    /// Add a file, or a directory tree, deflating every file.
    pub fn add_all_recursively<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.add_all_recursively_with(path, |_| true)
    }

    /// Add a file under its file name, or every file and directory below a
    /// directory under its relative, `/`-separated path.
    ///
    /// `may_compress` decides per file whether it is deflated.
    pub fn add_all_recursively_with<P, F>(&mut self, path: P, mut may_compress: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnMut(&Path) -> bool,
    {
        let root = path.as_ref();
        let method_for = |compress: bool| {
            if compress {
                CompressionMethod::Deflate
            } else {
                CompressionMethod::Store
            }
        };

        if root.is_file() {
            let Some(name) = root.file_name() else {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", root.display()),
                )));
            };
            let method = method_for(may_compress(root));
            return self.add_file(&name.to_string_lossy(), root, method);
        }

        for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let item = item.map_err(io::Error::from)?;
            let relative = item.path().strip_prefix(root).map_err(io::Error::other)?;
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if item.file_type().is_dir() {
                self.add_data(&format!("{name}/"), Vec::new(), CompressionMethod::Store)?;
            } else {
                let method = method_for(may_compress(item.path()));
                self.add_file(&name, item.path(), method)?;
            }
        }
        Ok(())
    }

    fn add_data(&mut self, name: &str, data: Vec<u8>, method: CompressionMethod) -> Result<()> {
        let crc32 = zedit_common::crc::hash_bytes(&data);
        let size = data.len() as u64;
        let modified = if self.options.no_timestamps {
            DosDateTime::ZERO
        } else {
            DosDateTime::now()
        };

        let (method, source, stored_size): (_, Rc<dyn EntrySource>, _) =
            if method == CompressionMethod::Deflate && !name.ends_with('/') {
                let result = self.compressor.compress(data)?;
                (result.method, result.source, result.stored_size)
            } else {
                (CompressionMethod::Store, Rc::new(BytesSource::new(data)), size)
            };

        let header = CentralDirectoryHeader::new(name, method, crc32, size, stored_size, modified);
        self.add_to_entries(StoredEntry::new(header, source))
    }

    fn add_to_entries(&mut self, entry: StoredEntry) -> Result<()> {
        let name = entry.name().to_owned();
        let replaced = self.delete_entry(&name);

        let block = self.position_in_file(&entry);
        trace!("'{name}' placed at [{}, {})", block.start(), block.end());
        let added = entry.clone();
        self.entries.insert(name, AllocatedEntry { block, entry });
        self.dirty = true;

        self.notify(|ext| ext.added(&added, replaced.as_ref()))
    }

    /// Reserve space for `entry`, dropping the central directory and EOCD
    /// first so that entries never land behind them.
    fn position_in_file(&mut self, entry: &StoredEntry) -> FileUseMapEntry<Block> {
        self.delete_directory_and_eocd();

        let size = entry.in_file_size();
        let alignment = self.choose_alignment(entry);
        let start = self.map.locate_free(
            size,
            entry.local_header_size(),
            alignment.into(),
            self.options.position_algorithm,
        );
        let end = start + size;
        if end > self.map.size() {
            self.map.extend(end);
        }
        self.map.add(start, end, Block::Entry(entry.name().to_owned()))
    }

    fn choose_alignment(&self, entry: &StoredEntry) -> u32 {
        let compressed = entry.header().method() == CompressionMethod::Deflate;
        self.options
            .alignment_rules
            .alignment(entry.name(), compressed)
    }

    /// Remove an entry.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let Some(removed) = self.delete_entry(name) else {
            return Err(Error::EntryNotFound(name.to_owned()));
        };
        self.notify(|ext| ext.removed(&removed))
    }

    /// Drop an entry from the table and the map without notifying. Returns
    /// the entry, marked deleted.
    fn delete_entry(&mut self, name: &str) -> Option<StoredEntry> {
        let AllocatedEntry { block, mut entry } = self.entries.remove(name)?;
        self.map.remove(&block);
        self.delete_directory_and_eocd();
        entry.mark_deleted();
        self.dirty = true;
        trace!("'{name}' removed from [{}, {})", block.start(), block.end());
        Some(entry)
    }

    /// Copy the entries of `source` into this archive, replacing entries of
    /// the same name.
    ///
    /// Entries whose name matches one of the `ignore` glob patterns are
    /// skipped, and so are entries already present with the same size and
    /// CRC. Data is copied as stored, without recompressing.
    pub fn merge_from(&mut self, source: &ZFile, ignore: &[&str]) -> Result<()> {
        let patterns = ignore
            .iter()
            .map(|pattern| glob::Pattern::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for from in source.entries() {
            let name = from.name();
            if patterns.iter().any(|pattern| pattern.matches(name)) {
                continue;
            }

            if let Some(existing) = self.get(name) {
                if existing.header().uncompressed_size() == from.header().uncompressed_size()
                    && existing.header().crc32() == from.header().crc32()
                {
                    continue;
                }
            }

            let header = from.header().clone_unwritten();
            let raw: Rc<dyn EntrySource> = Rc::new(BytesSource::new(from.raw_source().read_all()?));
            let source = entry::wrap_raw(raw, &header);
            trace!("merging '{name}'");
            self.add_to_entries(StoredEntry::new(header, source))?;
        }
        Ok(())
    }

    /// Move an entry so that its data satisfies its alignment rule.
    ///
    /// Returns `true` if a written entry had to be copied to a new place.
    /// Entries not yet written are just moved in the layout, and `false` is
    /// returned for them as for entries already aligned.
    pub fn realign(&mut self, name: &str) -> Result<bool> {
        let Some(allocated) = self.entries.get(name) else {
            return Err(Error::EntryNotFound(name.to_owned()));
        };

        let alignment = u64::from(self.choose_alignment(&allocated.entry));
        let data_start = allocated.block.start() + allocated.entry.local_header_size();
        if data_start % alignment == 0 {
            return Ok(false);
        }

        let entry = allocated.entry.clone();
        if entry.header().offset().is_none() {
            let old = allocated.block.clone();
            self.map.remove(&old);
            let block = self.position_in_file(&entry);
            trace!("'{name}' moved to [{}, {})", block.start(), block.end());
            if let Some(allocated) = self.entries.get_mut(name) {
                allocated.block = block;
            }
            return Ok(false);
        }

        let header = entry.header().clone_unwritten();
        let raw: Rc<dyn EntrySource> = Rc::new(BytesSource::new(entry.raw_source().read_all()?));
        let source = entry::wrap_raw(raw, &header);
        self.add_to_entries(StoredEntry::new(header, source))?;
        Ok(true)
    }

    /// Realign every entry. Returns `true` if any entry was rewritten.
    pub fn realign_all(&mut self) -> Result<bool> {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        let mut any = false;
        for name in names {
            // An extension may have removed it in the meantime.
            if self.entries.contains_key(&name) {
                any |= self.realign(&name)?;
            }
        }
        Ok(any)
    }

    /// Lay out all entries again in name order. Every entry is loaded into
    /// memory and rewritten on the next update.
    pub fn sort_zip_contents(&mut self) -> Result<()> {
        self.reopen_rw()?;
        debug!("sorting {} entries", self.entries.len());

        for allocated in self.entries.values_mut() {
            allocated.entry.load_source_into_memory()?;
        }

        let blocks: Vec<FileUseMapEntry<Block>> = self
            .entries
            .values()
            .map(|allocated| allocated.block.clone())
            .collect();
        for block in &blocks {
            self.map.remove(block);
        }
        self.delete_directory_and_eocd();
        self.map.truncate();

        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            let entry = self.entries[&name].entry.clone();
            let block = self.position_in_file(&entry);
            if let Some(allocated) = self.entries.get_mut(&name) {
                allocated.block = block;
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Mark the archive dirty so the next update rewrites the central
    /// directory.
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    /// Gap left between the last entry and the central directory.
    #[inline]
    pub fn extra_directory_offset(&self) -> u64 {
        self.extra_directory_offset
    }

    pub fn set_extra_directory_offset(&mut self, offset: u64) {
        if self.extra_directory_offset != offset {
            self.extra_directory_offset = offset;
            self.delete_directory_and_eocd();
            self.dirty = true;
        }
    }

    /// Comment stored in the EOCD.
    #[inline]
    pub fn eocd_comment(&self) -> &[u8] {
        &self.eocd_comment
    }

    /// Set the EOCD comment, at most 65535 bytes.
    pub fn set_eocd_comment(&mut self, comment: Vec<u8>) -> Result<()> {
        // Validate the length now rather than during update.
        Eocd::new(0, 0, 0, comment.clone())?;
        self.eocd_comment = comment;
        self.delete_directory_and_eocd();
        self.dirty = true;
        Ok(())
    }

    // Writing

    /// Write all pending changes to the file.
    ///
    /// Entries not in the file are written to the space reserved for them,
    /// free space is zeroed, and a new central directory and EOCD are
    /// appended after the last entry.
    pub fn update(&mut self) -> Result<()> {
        self.notify(|ext| ext.before_update())?;
        if !self.dirty {
            return Ok(());
        }

        debug!("updating {}", self.file.borrow().path().display());
        self.reopen_rw()?;
        if self.options.auto_sort_files {
            self.sort_zip_contents()?;
        }

        self.delete_directory_and_eocd();
        self.map.truncate();

        let mut cycles = 0;
        loop {
            self.write_pending()?;
            self.compute_central_directory()?;
            self.compute_eocd()?;
            self.notify(|ext| ext.entries_written())?;

            if self.eocd.is_some() {
                break;
            }
            cycles += 1;
            if cycles >= MAX_EXTENSION_CYCLES {
                return Err(Error::ExtensionCycle(cycles));
            }
            trace!("central directory invalidated by an extension, recomputing");
        }

        self.append_central_directory_and_eocd()?;
        let size = self.map.size();
        self.file.borrow_mut().set_len(size)?;
        self.dirty = false;
        debug!("wrote {} entries, {size} bytes", self.entries.len());

        self.notify(|ext| ext.updated())
    }

    /// Update, then release the file.
    ///
    /// The file is released even if the update fails. The archive can be
    /// used again afterwards; it reopens the file when needed.
    pub fn close(&mut self) -> Result<()> {
        let updated = self.update();
        let released = self.file.borrow_mut().close();
        updated?;
        released?;

        for extension in self.extensions.clone() {
            extension.borrow_mut().closed();
        }
        Ok(())
    }

    /// Write entries that are not in the file yet and zero free space, in
    /// file order.
    fn write_pending(&mut self) -> Result<()> {
        enum Work {
            Entry(String),
            Zero(u64, u64),
        }

        let size = self.map.size();
        let work: Vec<Work> = self
            .map
            .iter()
            .filter_map(|block| match block.store() {
                Some(Block::Entry(name)) => self.entries[name]
                    .entry
                    .header()
                    .offset()
                    .is_none()
                    .then(|| Work::Entry(name.clone())),
                Some(_) => None,
                None if block.end() != size => Some(Work::Zero(block.start(), block.end())),
                None => None,
            })
            .collect();

        for item in work {
            match item {
                Work::Entry(name) => self.write_entry(&name)?,
                Work::Zero(start, end) => self.zero_fill(start, end)?,
            }
        }
        Ok(())
    }

    fn write_entry(&mut self, name: &str) -> Result<()> {
        let no_timestamps = self.options.no_timestamps;
        let Some(allocated) = self.entries.get_mut(name) else {
            unreachable!("writing unknown entry '{name}'");
        };

        let start = allocated.block.start();
        let mut data = allocated.entry.to_header_data(no_timestamps)?;
        data.extend(allocated.entry.raw_source().read_all()?);
        assert_eq!(
            data.len() as u64,
            allocated.block.size(),
            "entry '{name}' does not fill its reserved space"
        );

        self.file.borrow_mut().write_at(start, &data)?;
        allocated.entry.replace_source_from_zip(&self.file, start);
        trace!("wrote '{name}' at {start} ({} bytes)", data.len());
        Ok(())
    }

    fn zero_fill(&mut self, start: u64, end: u64) -> Result<()> {
        trace!("zeroing [{start}, {end})");
        let zeros = vec![0u8; ZERO_CHUNK.min((end - start) as usize)];
        let mut file = self.file.borrow_mut();
        let mut at = start;
        while at < end {
            let len = zeros.len().min((end - at) as usize);
            file.write_at(at, &zeros[..len])?;
            at += len as u64;
        }
        Ok(())
    }

    fn compute_central_directory(&mut self) -> Result<()> {
        self.delete_directory_and_eocd();
        self.map.truncate();

        let offset = self.map.size() + self.extra_directory_offset;
        self.map.extend(offset);

        let directory = CentralDirectory::from_headers(
            self.entries
                .values()
                .map(|allocated| allocated.entry.header().clone()),
        );
        let size = directory.to_bytes()?.len() as u64;

        let block = (size > 0).then(|| {
            self.map.extend(offset + size);
            self.map.add(offset, offset + size, Block::CentralDirectory)
        });
        self.directory = Some(PlacedDirectory {
            offset,
            block,
            directory,
        });
        Ok(())
    }

    fn compute_eocd(&mut self) -> Result<()> {
        let Some(placed) = &self.directory else {
            unreachable!("EOCD computed without a central directory");
        };

        let eocd = Eocd::new(
            placed.directory.len() as u64,
            placed.offset,
            placed.size(),
            self.eocd_comment.clone(),
        )?;

        let start = self.map.size();
        let end = start + eocd.size() as u64;
        self.map.extend(end);
        let block = self.map.add(start, end, Block::Eocd);
        self.eocd = Some(PlacedEocd { block, eocd });
        Ok(())
    }

    fn append_central_directory_and_eocd(&mut self) -> Result<()> {
        let Some(directory_offset) = self.directory.as_ref().map(|placed| placed.offset) else {
            unreachable!("appending a central directory that was not computed");
        };
        if self.extra_directory_offset > 0 {
            self.zero_fill(directory_offset - self.extra_directory_offset, directory_offset)?;
        }

        let (Some(directory), Some(eocd)) = (&self.directory, &self.eocd) else {
            unreachable!("appending a central directory that was not computed");
        };
        let mut file = self.file.borrow_mut();
        if let Some(block) = &directory.block {
            file.write_at(block.start(), directory.directory.to_bytes()?)?;
        }
        file.write_at(eocd.block.start(), eocd.eocd.to_bytes())?;
        Ok(())
    }

    fn delete_directory_and_eocd(&mut self) {
        if let Some(PlacedDirectory {
            block: Some(block), ..
        }) = self.directory.take()
        {
            self.map.remove(&block);
        }
        if let Some(placed) = self.eocd.take() {
            self.map.remove(&placed.block);
        }
    }

    // Layout queries

    /// Offset of the central directory, or where it would go if written now.
    pub fn central_directory_offset(&self) -> u64 {
        match &self.directory {
            Some(directory) => directory.offset,
            None if self.entries.is_empty() => self.extra_directory_offset,
            None => self.map.used_size() + self.extra_directory_offset,
        }
    }

    /// Size of the central directory.
    ///
    /// While entries exist but the directory has not been computed, this is
    /// a non-zero placeholder.
    pub fn central_directory_size(&self) -> u64 {
        match &self.directory {
            Some(directory) => directory.size(),
            None if self.entries.is_empty() => 0,
            None => 1,
        }
    }

    /// Serialized central directory.
    ///
    /// # Panics
    ///
    /// Panics if there are entries and the directory is out of date, that
    /// is, if the archive changed since the last update.
    pub fn central_directory_bytes(&self) -> Result<&[u8]> {
        match &self.directory {
            Some(directory) => directory.directory.to_bytes(),
            None if self.entries.is_empty() => Ok(&[][..]),
            None => panic!("central directory has not been computed"),
        }
    }

    /// Offset of the EOCD, `None` if it is out of date.
    pub fn eocd_offset(&self) -> Option<u64> {
        self.eocd.as_ref().map(|placed| placed.block.start())
    }

    /// Size of the EOCD, `None` if it is out of date.
    pub fn eocd_size(&self) -> Option<u64> {
        self.eocd.as_ref().map(|placed| placed.block.size())
    }

    /// Serialized EOCD, `None` if it is out of date.
    pub fn eocd_bytes(&self) -> Option<&[u8]> {
        self.eocd.as_ref().map(|placed| placed.eocd.to_bytes())
    }

    // Raw access

    /// Open the backing file for reading if it is closed.
    pub fn open_read_only(&mut self) -> Result<()> {
        self.file.borrow_mut().open_read_only()
    }

    /// Read raw bytes of the file at `offset`. Returns how many bytes were
    /// read, fewer than `buf.len()` at the end of the file.
    pub fn direct_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let data = self.file.borrow_mut().read_at(offset, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Write raw bytes to the file at `offset`, bypassing the layout.
    pub fn direct_write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.reopen_rw()?;
        self.file.borrow_mut().write_at(offset, data)
    }

    fn reopen_rw(&mut self) -> Result<()> {
        let was_closed = self.file.borrow_mut().reopen_rw()?;
        if was_closed {
            self.notify(|ext| ext.open())?;
        }
        Ok(())
    }

    // Extensions

    pub fn add_extension(&mut self, extension: ExtensionHandle) {
        self.extensions.push(extension);
    }

    pub fn remove_extension(&mut self, extension: &ExtensionHandle) {
        self.extensions
            .retain(|registered| !extension::same_extension(registered, extension));
    }

    /// Deliver an event to every extension, then run the actions they
    /// returned unless an outer notification is already running them.
    fn notify<F>(&mut self, hook: F) -> Result<()>
    where
        F: FnMut(&mut dyn ZFileExtension) -> HookResult,
    {
        let actions = extension::dispatch(&self.extensions, hook)?;
        self.pending.extend(actions);
        if self.notifying {
            return Ok(());
        }

        self.notifying = true;
        let mut result = Ok(());
        while let Some(action) = self.pending.pop_front() {
            if let Err(err) = action(self) {
                self.pending.clear();
                result = Err(err);
                break;
            }
        }
        self.notifying = false;
        result
    }
}

impl fmt::Debug for ZFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZFile")
            .field("path", &self.file.borrow().path())
            .field("entries", &self.entries.len())
            .field("size", &self.map.size())
            .field("dirty", &self.dirty)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ZFile {
    fn drop(&mut self) {
        if self.dirty {
            warn!(
                "{} dropped with unwritten changes",
                self.file.borrow().path().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(zip: &mut ZFile, name: &str, data: &[u8]) {
        zip.add_bytes(name, data.to_vec(), CompressionMethod::Store)
            .unwrap();
    }

    #[test]
    fn test_new_archive_is_dirty_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.zip");

        let mut zip = ZFile::open(&path).unwrap();
        assert!(zip.is_dirty());
        assert!(zip.is_empty());
        assert_eq!(zip.central_directory_offset(), 0);
        assert_eq!(zip.central_directory_size(), 0);
        assert_eq!(zip.eocd_offset(), None);

        zip.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), Eocd::MIN_SIZE);
        assert_eq!(&bytes[..4], &Eocd::MAGIC);
        assert_eq!(zip.eocd_offset(), Some(0));
    }

    #[test]
    fn test_layout_after_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");

        let mut zip = ZFile::open(&path).unwrap();
        stored(&mut zip, "a", b"12345");
        assert_eq!(zip.central_directory_size(), 1);
        assert_eq!(zip.central_directory_offset(), 36);

        zip.update().unwrap();
        assert!(!zip.is_dirty());
        assert_eq!(zip.central_directory_offset(), 36);
        assert_eq!(zip.central_directory_size(), 47);
        assert_eq!(zip.eocd_offset(), Some(83));
        assert_eq!(zip.eocd_size(), Some(22));
        assert_eq!(zip.central_directory_bytes().unwrap().len(), 47);
        assert_eq!(zip.get("a").unwrap().header().offset(), Some(0));
        zip.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 105);
    }

    #[test]
    fn test_add_drops_directory_and_eocd() {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = ZFile::open(dir.path().join("a.zip")).unwrap();
        stored(&mut zip, "a", b"1");
        zip.update().unwrap();
        assert!(zip.eocd_bytes().is_some());

        stored(&mut zip, "b", b"2");
        assert!(zip.eocd_bytes().is_none());
        assert!(zip.is_dirty());
        zip.close().unwrap();
    }

    #[test]
    fn test_delete_drops_directory_and_eocd() {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = ZFile::open(dir.path().join("a.zip")).unwrap();
        stored(&mut zip, "a", b"1");
        stored(&mut zip, "b", b"2");
        zip.update().unwrap();
        assert!(zip.eocd_bytes().is_some());

        zip.delete("b").unwrap();
        assert!(zip.eocd_bytes().is_none());
        assert!(zip.is_dirty());
        // Only "a" is left to place the directory after.
        assert_eq!(zip.central_directory_offset(), 32);
        zip.close().unwrap();
    }

    #[test]
    fn test_replace_reuses_space() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");

        let mut zip = ZFile::open(&path).unwrap();
        stored(&mut zip, "a", &[1; 100]);
        stored(&mut zip, "b", &[2; 10]);
        zip.close().unwrap();

        let mut zip = ZFile::open(&path).unwrap();
        zip.delete("a").unwrap();
        // Too big for the space freed by the central directory and EOCD.
        stored(&mut zip, "c", &[3; 90]);
        assert_eq!(zip.get("c").unwrap().header().offset(), None);
        zip.update().unwrap();
        assert_eq!(zip.get("c").unwrap().header().offset(), Some(0));
        assert_eq!(zip.read("c").unwrap(), vec![3; 90]);
        zip.close().unwrap();
    }

    #[test]
    fn test_delete_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut zip = ZFile::open(dir.path().join("a.zip")).unwrap();
        assert!(matches!(zip.delete("nope"), Err(Error::EntryNotFound(n)) if n == "nope"));
        assert!(matches!(zip.read("nope"), Err(Error::EntryNotFound(_))));
        zip.close().unwrap();
    }

    #[test]
    fn test_sort_lays_out_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");

        let mut zip = ZFile::open(&path).unwrap();
        stored(&mut zip, "z", b"last");
        stored(&mut zip, "a", b"first");
        zip.update().unwrap();
        assert!(zip.get("z").unwrap().header().offset() < zip.get("a").unwrap().header().offset());

        zip.sort_zip_contents().unwrap();
        zip.close().unwrap();
        assert!(zip.get("a").unwrap().header().offset() < zip.get("z").unwrap().header().offset());

        let zip = ZFile::open(&path).unwrap();
        assert_eq!(zip.read("a").unwrap(), b"first");
        assert_eq!(zip.read("z").unwrap(), b"last");
    }

    #[test]
    fn test_direct_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");

        let mut zip = ZFile::open(&path).unwrap();
        stored(&mut zip, "a", b"abc");
        zip.close().unwrap();

        let mut zip = ZFile::open(&path).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(zip.direct_read(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, &[0x50, 0x4b, 0x03, 0x04]);

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(zip.direct_read(len - 2, &mut buf).unwrap(), 2);

        zip.direct_write(31, b"X").unwrap();
        zip.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[31], b'X');
    }
}
