//! Error types for zedit-common.

use thiserror::Error;

/// Common error type for zedit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A field did not hold the value it was expected to hold.
    #[error("incorrect value for field '{field}': value is {actual} but {expected} expected")]
    FieldMismatch {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    /// A field value breaks one of the field's invariants.
    #[error("value {value} of field '{field}' is invalid (fails '{constraint}')")]
    FieldInvariant {
        field: &'static str,
        value: u64,
        constraint: String,
    },

    /// A value does not fit in the field's width.
    #[error("value {value} does not fit in field '{field}'")]
    FieldOverflow { field: &'static str, value: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
