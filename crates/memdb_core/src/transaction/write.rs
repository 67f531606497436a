//! Read-write transactions.

use super::{Change, CommitInfo, WorkingSet};
use crate::database::Database;
use crate::error::CoreResult;
use crate::index::{IndexIter, IndexStore};
use crate::schema::Record;
use crate::snapshot::Snapshot;
use crate::types::{IndexKey, SequenceNumber};
use std::fmt;
use std::sync::Arc;

/// A read-write transaction.
///
/// Writes go to private working copies of the touched indexes and are
/// visible to this transaction's own reads immediately. Nothing is visible
/// to anyone else until [`WriteTxn::commit`] succeeds. Dropping the
/// transaction without committing discards it.
pub struct WriteTxn<'db, R: Record> {
    db: &'db Database<R>,
    work: WorkingSet<R>,
    changes: Vec<Change<R>>,
}

impl<'db, R: Record> WriteTxn<'db, R> {
    pub(crate) fn new(db: &'db Database<R>, base: Arc<Snapshot<R>>) -> Self {
        Self {
            db,
            work: WorkingSet::new(base),
            changes: Vec::new(),
        }
    }

    /// Returns the sequence number of the snapshot this transaction began on.
    #[must_use]
    pub fn base_sequence(&self) -> SequenceNumber {
        self.work.base().sequence()
    }

    /// Inserts a record into every index of `table`.
    ///
    /// A record with the same primary key is replaced. Returns the primary
    /// key.
    ///
    /// # Errors
    ///
    /// - `UnknownTable` if `table` is not in the schema
    /// - `IndexKey` if an indexer cannot extract a key from the record
    /// - `UniqueViolation` if a strict unique index holds the key for
    ///   another record
    ///
    /// None of these affect the rest of the transaction.
    pub fn insert(&mut self, table: &str, record: R) -> CoreResult<IndexKey> {
        let table_id = self.schema_table_id(table)?;
        let record = Arc::new(record);
        let primary = self.work.insert(table_id, Arc::clone(&record))?;
        self.changes
            .push(Change::insert(table, primary.clone(), record));
        Ok(primary)
    }

    /// Deletes the stored record that has the same primary key as `record`.
    ///
    /// Deleting an absent record is a no-op that still counts as a change.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown or the primary key cannot be
    /// extracted from `record`.
    pub fn delete(&mut self, table: &str, record: &R) -> CoreResult<()> {
        let table_id = self.schema_table_id(table)?;
        let primary = self
            .work
            .base()
            .schema()
            .table_at(table_id)
            .primary_key(record)?;
        self.delete_at(table_id, table, primary);
        Ok(())
    }

    /// Deletes the record stored under a primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown.
    pub fn delete_key(&mut self, table: &str, primary_key: impl Into<IndexKey>) -> CoreResult<()> {
        let table_id = self.schema_table_id(table)?;
        self.delete_at(table_id, table, primary_key.into());
        Ok(())
    }

    fn delete_at(&mut self, table_id: usize, table: &str, primary: IndexKey) {
        self.work.delete_key(table_id, &primary);
        self.changes.push(Change::delete(table, primary));
    }

    fn schema_table_id(&self, table: &str) -> CoreResult<usize> {
        self.work.base().schema().table_id(table)
    }

    fn store(&self, table: &str, index: &str) -> CoreResult<&IndexStore<R>> {
        let (t, i) = self.work.base().schema().locate(table, index)?;
        Ok(self.work.store(t, i))
    }

    /// Looks up a record, seeing this transaction's own writes.
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
        Ok(self.store(table, index)?.get(&key.into()))
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
        Ok(self.store(table, index)?.get_all(&key.into()))
    }

    /// Iterates over an index as this transaction currently sees it.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn iter(&self, table: &str, index: &str) -> CoreResult<IndexIter<R>> {
        Ok(self.store(table, index)?.iter())
    }

    /// Iterates from the first key at or after `from`.
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
        Ok(self.store(table, index)?.iter_from(&from.into()))
    }

    /// Returns the number of records in a table, including pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not in the schema.
    pub fn len(&self, table: &str) -> CoreResult<usize> {
        let table_id = self.schema_table_id(table)?;
        let primary = self.work.base().schema().table_at(table_id).primary_position();
        Ok(self.work.store(table_id, primary).len())
    }

    /// Returns the changes made so far, in order.
    #[must_use]
    pub fn changes(&self) -> &[Change<R>] {
        &self.changes
    }

    /// Returns true if the transaction has made no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Commits the transaction.
    ///
    /// The changes are appended to the WAL as one batch, in the order they
    /// were made, and then a new snapshot is published. If another
    /// transaction committed first, the changes are re-applied on top of
    /// its result. A transaction without changes commits without touching
    /// the WAL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed, a record cannot be
    /// encoded, re-applying a change violates a strict unique index, or the
    /// WAL append fails. The database is then exactly as it was.
    pub fn commit(self) -> CoreResult<CommitInfo> {
        self.db.commit_write(self.work, self.changes)
    }
}

impl<R: Record> fmt::Debug for WriteTxn<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTxn")
            .field("base", self.work.base())
            .field("changes", &self.changes.len())
            .finish_non_exhaustive()
    }
}
