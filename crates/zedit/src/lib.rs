//! Zedit - in-place ZIP archive editing library.
//!
//! This crate provides a unified interface to the Zedit library ecosystem
//! for reading and rewriting ZIP files without repacking them.
//!
//! # Crates
//!
//! - [`zedit_common`] - Common utilities (binary reading, field codec, CRC32)
//! - [`zedit_zfile`] - The archive engine (layout tracking, entries, alignment)
//!
//! # Example
//!
//! ```no_run
//! use zedit::prelude::*;
//!
//! let options = ZFileOptions::default()
//!     .with_alignment_rules(AlignmentRules::new().with_rule(AlignmentRule::new("*.so", 4096)?));
//! let mut zip = ZFile::open_with_options("app.apk", options)?;
//!
//! zip.add_file("lib/arm64-v8a/libnative.so", "build/libnative.so", CompressionMethod::Store)?;
//! zip.realign_all()?;
//! zip.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use zedit_common as common;
pub use zedit_zfile as zfile;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use zedit_common::{crc, BinaryReader, ZipField};
    pub use zedit_zfile::{
        AlignmentRule, AlignmentRules, CompressionMethod, EntrySource, StoredEntry,
        StoredEntryType, ZFile, ZFileExtension, ZFileOptions,
    };
}

// Re-export commonly used types at the crate root
pub use zedit_zfile::{Error, Result, ZFile};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
