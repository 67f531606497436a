//! Error types for memdb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in memdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The schema definition is malformed.
    #[error("schema error: {message}")]
    Schema {
        /// What is wrong with the schema.
        message: String,
    },

    /// An indexer could not extract a key from a record.
    ///
    /// The write transaction stays usable; only the offending record is
    /// not applied.
    #[error("cannot extract key for index {table}.{index}: {message}")]
    IndexKey {
        /// Table the record was written to.
        table: String,
        /// Index whose indexer failed.
        index: String,
        /// Description of the failure.
        message: String,
    },

    /// A strict unique index already holds the key for another record.
    #[error("unique index {table}.{index} already holds key {key}")]
    UniqueViolation {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Debug rendering of the conflicting key.
        key: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] memdb_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] memdb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A WAL entry is corrupted or malformed.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// The table is not part of the schema.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// Name that was looked up.
        name: String,
    },

    /// The index is not declared on the table.
    #[error("unknown index {index} on table {table}")]
    UnknownIndex {
        /// Table name.
        table: String,
        /// Index name that was looked up.
        index: String,
    },

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Invalid database format or location.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates an index key extraction error.
    pub fn index_key(
        table: impl Into<String>,
        index: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::IndexKey {
            table: table.into(),
            index: index.into(),
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates an unknown index error.
    pub fn unknown_index(table: impl Into<String>, index: impl Into<String>) -> Self {
        Self::UnknownIndex {
            table: table.into(),
            index: index.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for failures of the durable log or its substrate.
    ///
    /// These are fatal to the commit or open that raised them.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Codec(_)
                | Self::Io(_)
                | Self::WalCorruption { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}
