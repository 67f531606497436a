//! Read-only transactions.

use crate::error::CoreResult;
use crate::index::IndexIter;
use crate::schema::Record;
use crate::snapshot::Snapshot;
use crate::types::{IndexKey, SequenceNumber};
use std::fmt;
use std::sync::Arc;

/// A read-only view bound to the snapshot that was current when it began.
///
/// Commits made after the transaction began are never visible through it.
/// It holds no locks and is `Send`, so it can be moved to another thread.
pub struct ReadTxn<R> {
    snapshot: Arc<Snapshot<R>>,
}

impl<R: Record> ReadTxn<R> {
    pub(crate) fn new(snapshot: Arc<Snapshot<R>>) -> Self {
        Self { snapshot }
    }

    /// Returns the snapshot this transaction reads.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<Snapshot<R>> {
        &self.snapshot
    }

    /// Returns the sequence number of the snapshot.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.snapshot.sequence()
    }

    /// Looks up a record by index key. Absent keys yield `None`.
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
        self.snapshot.get(table, index, &key.into())
    }

    /// Returns every record stored under `key` in a non-unique index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn get_all(
        &self,
        table: &str,
        index: &str,
        key: impl Into<IndexKey>,
    ) -> CoreResult<Vec<Arc<R>>> {
        Ok(self.snapshot.index(table, index)?.get_all(&key.into()))
    }

    /// Iterates over an index from its smallest key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn iter(&self, table: &str, index: &str) -> CoreResult<IndexIter<R>> {
        self.snapshot.iter(table, index)
    }

    /// Iterates over an index from the first key at or after `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn iter_from(
        &self,
        table: &str,
        index: &str,
        from: impl Into<IndexKey>,
    ) -> CoreResult<IndexIter<R>> {
        Ok(self.snapshot.index(table, index)?.iter_from(&from.into()))
    }

    /// Returns the number of records in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not in the schema.
    pub fn len(&self, table: &str) -> CoreResult<usize> {
        self.snapshot.len(table)
    }

    /// Ends the transaction, releasing its snapshot.
    pub fn commit(self) {}
}

impl<R> fmt::Debug for ReadTxn<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTxn")
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
