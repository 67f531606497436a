//! Transaction engine.
//!
//! Read transactions pin one immutable [`Snapshot`](crate::Snapshot).
//! Write transactions buffer copy-on-write working copies of the indexes
//! they touch plus the list of [`Change`]s they made; committing appends the
//! changes to the WAL as one batch and then publishes a new snapshot.

mod manager;
mod read;
mod working;
mod write;

pub(crate) use manager::TransactionManager;
pub use read::ReadTxn;
pub(crate) use working::WorkingSet;
pub use write::WriteTxn;

use crate::error::CoreResult;
use crate::index::IndexIter;
use crate::schema::Record;
use crate::types::{IndexKey, SequenceNumber};
use std::fmt;
use std::sync::Arc;

/// One insert or delete made by a write transaction.
///
/// A change with no record is a tombstone: the key identified by
/// `primary_key` is deleted.
pub struct Change<R> {
    table: String,
    primary_key: IndexKey,
    record: Option<Arc<R>>,
}

impl<R> Change<R> {
    /// Creates an insert change.
    #[must_use]
    pub fn insert(table: impl Into<String>, primary_key: IndexKey, record: Arc<R>) -> Self {
        Self {
            table: table.into(),
            primary_key,
            record: Some(record),
        }
    }

    /// Creates a tombstone.
    #[must_use]
    pub fn delete(table: impl Into<String>, primary_key: IndexKey) -> Self {
        Self {
            table: table.into(),
            primary_key,
            record: None,
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the primary key of the affected record.
    #[must_use]
    pub fn primary_key(&self) -> &IndexKey {
        &self.primary_key
    }

    /// Returns the inserted record, or `None` for a tombstone.
    #[must_use]
    pub fn record(&self) -> Option<&Arc<R>> {
        self.record.as_ref()
    }

    /// Returns true if this change deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.record.is_none()
    }
}

impl<R> Clone for Change<R> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            primary_key: self.primary_key.clone(),
            record: self.record.clone(),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Change<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Change")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("record", &self.record)
            .finish()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Number of changes made durable.
    pub changes: usize,
    /// Sequence number of the snapshot the commit produced.
    pub sequence: SequenceNumber,
    /// True if another commit landed after this transaction began, so its
    /// changes were re-applied on top of the newer snapshot.
    pub rebased: bool,
}

/// A read or write transaction, as returned by
/// [`Database::txn`](crate::Database::txn).
pub enum Txn<'db, R: Record> {
    /// Read-only transaction.
    Read(ReadTxn<R>),
    /// Read-write transaction.
    Write(WriteTxn<'db, R>),
}

impl<'db, R: Record> Txn<'db, R> {
    /// Returns true for write transactions.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    /// Returns the write transaction, if this is one.
    #[must_use]
    pub fn into_write(self) -> Option<WriteTxn<'db, R>> {
        match self {
            Self::Write(txn) => Some(txn),
            Self::Read(_) => None,
        }
    }

    /// Borrows the write transaction, if this is one.
    pub fn as_write_mut(&mut self) -> Option<&mut WriteTxn<'db, R>> {
        match self {
            Self::Write(txn) => Some(txn),
            Self::Read(_) => None,
        }
    }

    /// Looks up a record by index key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn get(
        &self,
        table: &str,
        index: &str,
        key: impl Into<IndexKey>,
    ) -> CoreResult<Option<Arc<R>>> {
        match self {
            Self::Read(txn) => txn.get(table, index, key),
            Self::Write(txn) => txn.get(table, index, key),
        }
    }

    /// Iterates over an index in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn iter(&self, table: &str, index: &str) -> CoreResult<IndexIter<R>> {
        match self {
            Self::Read(txn) => txn.iter(table, index),
            Self::Write(txn) => txn.iter(table, index),
        }
    }

    /// Commits a write transaction or releases a read transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a write commit fails; see [`WriteTxn::commit`].
    pub fn commit(self) -> CoreResult<CommitInfo> {
        match self {
            Self::Read(txn) => {
                let sequence = txn.sequence();
                txn.commit();
                Ok(CommitInfo {
                    changes: 0,
                    sequence,
                    rebased: false,
                })
            }
            Self::Write(txn) => txn.commit(),
        }
    }
}
