//! Error types for feather-db.

use thiserror::Error;

/// Result type alias for fallible feather-db operations.
pub type Result<T> = std::result::Result<T, FeatherError>;

/// Errors surfaced by the store and its persistence layer.
///
/// Absence is not an error: lookups on unknown ids or modalities return
/// `None` or empty collections, and `link`/`touch` on unknown ids are silent
/// no-ops.
#[derive(Error, Debug)]
pub enum FeatherError {
    /// A vector's length does not match the modality's fixed dimension, or a
    /// modality was requested with a dimension conflicting with an existing one.
    #[error("dimension mismatch for modality '{modality}': expected {expected}, got {got}")]
    DimensionMismatch {
        modality: String,
        expected: usize,
        got: usize,
    },

    /// The file magic matched but the version is outside the supported range.
    #[error("unsupported file version {0} (supported: 2-5)")]
    UnsupportedVersion(u32),

    /// Read/write/open failure on the persistence path.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Truncated records, overrunning length prefixes, or invalid field bytes.
    #[error("corrupt store file: {0}")]
    Corrupt(String),
}
