//! Error types for dependency file and manifest storage.

use std::path::PathBuf;

use keystone_rulekey::HashError;

/// Errors that can occur while reading or writing cache state.
///
/// Manifest loads are fail-safe and never produce these; they surface from
/// writes, dependency file reads, and input hashing during lookup.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A dependency file could not be parsed.
    #[error("failed to parse dependency file {path}: {reason}")]
    DepFileParse {
        /// The dependency file.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// An input could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
}
