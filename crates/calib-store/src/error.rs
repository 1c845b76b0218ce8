//! Error and Result types for calibration store operations.

use crate::id::IdRange;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for calibration store operations.
pub type Result<T> = std::result::Result<T, CalibError>;

/// The error type for calibration store operations.
///
/// A lookup that finds nothing is not an error; see [`crate::store::Lookup`].
#[derive(Debug, Error)]
pub enum CalibError {
    /// Snapshot failed a precondition check. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A strict range insertion overlaps a stored range that differs
    /// beyond the configured boundary tolerance. Nothing was written.
    #[error("Range conflict: requested {requested} overlaps existing {existing}")]
    RangeConflict {
        /// Range already present on disk.
        existing: IdRange,
        /// Range the caller tried to insert.
        requested: IdRange,
    },

    /// The advisory write guard refused a ranged write.
    #[error("Write refused: {0}")]
    WriteRefused(String),

    /// Invalid magic bytes in a snapshot file.
    #[error("Invalid magic bytes: expected ACAL, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported snapshot file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Snapshot file checksum does not match its content.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// CRC32 stored in the file footer.
        expected: u32,
        /// CRC32 computed over the file content.
        actual: u32,
    },

    /// Snapshot file content is structurally invalid.
    #[error("Corrupt snapshot file: {0}")]
    Corrupt(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
