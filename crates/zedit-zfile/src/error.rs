//! Error types for the zfile crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or editing an archive.
///
/// Misuse of the API (touching a deleted entry, allocating over used space)
/// is not reported here; those are bugs and panic.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error (field codec, buffer bounds).
    #[error("{0}")]
    Common(#[from] zedit_common::Error),

    /// Invalid ZIP magic bytes.
    #[error("invalid ZIP signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Could not find the end of central directory record.
    #[error("EOCD signature not found in the last {searched} bytes of the file")]
    EocdNotFound { searched: usize },

    /// A Zip64 locator precedes the EOCD.
    #[error("Zip64 EOCD locator found but Zip64 format is not supported")]
    Zip64Unsupported,

    /// The archive spans several volumes.
    #[error("multi-volume archives are not supported ({0})")]
    MultiVolume(&'static str),

    /// Two central directory records share a name.
    #[error("duplicate entry in central directory: {0}")]
    DuplicateEntry(String),

    /// General purpose flag bits the engine cannot honor.
    #[error("unsupported general purpose flags: {0:#06x}")]
    UnsupportedFlags(u16),

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Unsupported version needed to extract.
    #[error("unsupported version needed to extract: {0}")]
    UnsupportedVersion(u16),

    /// The local header disagrees with the central directory.
    #[error("entry '{entry}': {source}")]
    LocalHeaderMismatch {
        entry: String,
        #[source]
        source: zedit_common::Error,
    },

    /// The name in the local header disagrees with the central directory.
    #[error("central directory name '{central}' does not match local header name '{local}'")]
    NameMismatch { central: String, local: String },

    /// Structural corruption that is not tied to a single field.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// The backing file changed since this archive last closed it.
    #[error("file '{}' has been modified by an external application", .0.display())]
    ExternallyModified(PathBuf),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Invalid glob pattern in an alignment rule or ignore list.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    /// Alignment is not a power of two.
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(u32),

    /// DEFLATE level outside 0..=9.
    #[error("compression level {0} is out of range (0-9)")]
    InvalidCompressionLevel(u32),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Extensions kept invalidating the central directory.
    #[error("extensions keep resetting the central directory after {0} cycles")]
    ExtensionCycle(usize),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
