//! Common utilities for zedit.
//!
//! This crate provides the foundational pieces the archive engine is built on:
//!
//! - [`BinaryReader`] - Bounds-checked cursor over byte slices
//! - [`ZipField`] - Fixed-offset little-endian record fields with invariant checks
//! - [`crc`] - CRC-32 (IEEE) hashing utilities

mod error;
mod field;
mod reader;

pub mod crc;

pub use error::{Error, Result};
pub use field::{FieldInvariant, FieldWidth, ZipField};
pub use reader::BinaryReader;
