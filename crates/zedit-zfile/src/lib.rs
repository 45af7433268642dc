//! In-place ZIP archive editing.
//!
//! [`ZFile`] opens a ZIP file, lets entries be added, replaced, deleted,
//! merged from another archive and realigned, and writes the result back
//! into the same file. Only changed entries are written: the engine tracks
//! which byte ranges of the file are in use and puts new data into the
//! best-fitting free range.
//!
//! Supported:
//!
//! - Stored (method 0) and raw DEFLATE (method 8) entries
//! - Data descriptors, with or without signature, on read
//! - UTF-8 or ASCII entry names
//! - Per-pattern alignment of entry data (e.g. page-aligned `.so` files)
//! - Extensions that observe changes and can react to them
//!
//! Zip64 and multi-volume archives are rejected.
//!
//! # Example
//!
//! ```no_run
//! use zedit_zfile::{CompressionMethod, ZFile};
//!
//! let mut zip = ZFile::open("out.zip")?;
//! zip.add_bytes("a.txt", b"hello".to_vec(), CompressionMethod::Store)?;
//! zip.add_bytes("b/", Vec::new(), CompressionMethod::Store)?;
//! zip.close()?;
//!
//! let zip = ZFile::open("out.zip")?;
//! for entry in zip.entries() {
//!     println!("{}: {} bytes", entry.name(), entry.header().uncompressed_size());
//! }
//! # Ok::<(), zedit_zfile::Error>(())
//! ```

mod alignment;
mod compress;
mod directory;
mod entry;
mod error;
mod extension;
mod file_use_map;
mod header;
mod options;
mod source;
mod storage;
mod zfile;
pub mod zip;

pub use alignment::{AlignmentRule, AlignmentRules, NO_ALIGNMENT};
pub use compress::{inflate, CompressionResult, Compressor, DeflateCompressor};
pub use directory::CentralDirectory;
pub use entry::{StoredEntry, StoredEntryType};
pub use error::{Error, Result};
pub use extension::{DeferredAction, ExtensionHandle, HookResult, ZFileExtension};
pub use file_use_map::{FileUseMap, FileUseMapEntry, PositionAlgorithm};
pub use header::CentralDirectoryHeader;
pub use options::{ZFileOptions, DEFAULT_COMPRESSION_LEVEL};
pub use source::{BytesSource, DeflatedSource, EntrySource, FileRangeSource, InflaterSource};
pub use storage::FileState;
pub use zfile::{ZFile, MAX_EXTENSION_CYCLES};
pub use zip::CompressionMethod;
