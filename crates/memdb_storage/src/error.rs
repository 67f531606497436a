//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry with this name already exists. Entries are never overwritten.
    #[error("entry already exists: {name}")]
    EntryExists {
        /// Name of the existing entry.
        name: String,
    },

    /// No entry with this name exists.
    #[error("entry not found: {name}")]
    EntryNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The entry name cannot be used by this store.
    #[error("invalid entry name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The storage location is not usable.
    #[error("invalid storage location: {0}")]
    InvalidLocation(String),
}
