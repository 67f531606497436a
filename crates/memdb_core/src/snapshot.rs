//! Immutable point-in-time views of the database.

use crate::error::CoreResult;
use crate::index::{IndexIter, IndexStore};
use crate::schema::{DBSchema, Record};
use crate::types::{IndexKey, SequenceNumber};
use std::fmt;
use std::sync::Arc;

/// Every index store of the database at one point in time.
///
/// Snapshots are never mutated. Commits derive a new snapshot that shares
/// all untouched index structure with its predecessor.
pub struct Snapshot<R> {
    schema: Arc<DBSchema<R>>,
    /// `tables[t][i]` is index `i` of table `t`, in schema order.
    tables: Vec<Vec<IndexStore<R>>>,
    sequence: SequenceNumber,
}

impl<R: Record> Snapshot<R> {
    /// Creates a snapshot with every index empty.
    #[must_use]
    pub fn empty(schema: &Arc<DBSchema<R>>) -> Self {
        let tables = schema
            .tables()
            .iter()
            .map(|table| {
                table
                    .indexes()
                    .iter()
                    .map(|index| IndexStore::new(index.is_unique()))
                    .collect()
            })
            .collect();

        Self {
            schema: Arc::clone(schema),
            tables,
            sequence: SequenceNumber::ZERO,
        }
    }

    /// Returns the schema this snapshot was built for.
    #[must_use]
    pub fn schema(&self) -> &Arc<DBSchema<R>> {
        &self.schema
    }

    /// Returns the sequence number of the last WAL entry reflected here.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the store of one index.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn index(&self, table: &str, index: &str) -> CoreResult<&IndexStore<R>> {
        let (t, i) = self.schema.locate(table, index)?;
        Ok(self.store_at(t, i))
    }

    /// Looks up a record by index key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn get(&self, table: &str, index: &str, key: &IndexKey) -> CoreResult<Option<Arc<R>>> {
        Ok(self.index(table, index)?.get(key))
    }

    /// Iterates over an index in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is not in the schema.
    pub fn iter(&self, table: &str, index: &str) -> CoreResult<IndexIter<R>> {
        Ok(self.index(table, index)?.iter())
    }

    /// Returns the number of records in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not in the schema.
    pub fn len(&self, table: &str) -> CoreResult<usize> {
        let t = self.schema.table_id(table)?;
        let primary = self.schema.table_at(t).primary_position();
        Ok(self.store_at(t, primary).len())
    }

    pub(crate) fn store_at(&self, table: usize, index: usize) -> &IndexStore<R> {
        &self.tables[table][index]
    }

    /// Builds a successor from replacement stores, `None` keeping ours.
    pub(crate) fn derive(
        &self,
        replacements: Vec<Vec<Option<IndexStore<R>>>>,
        sequence: SequenceNumber,
    ) -> Self {
        let tables = self
            .tables
            .iter()
            .zip(replacements)
            .map(|(stores, replaced)| {
                stores
                    .iter()
                    .zip(replaced)
                    .map(|(store, replacement)| replacement.unwrap_or_else(|| store.clone()))
                    .collect()
            })
            .collect();

        Self {
            schema: Arc::clone(&self.schema),
            tables,
            sequence,
        }
    }
}

impl<R> fmt::Debug for Snapshot<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence)
            .field("tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::testing::{item_schema, Item};

    #[test]
    fn empty_snapshot_has_every_index() {
        let schema = Arc::new(item_schema());
        let snapshot = Snapshot::empty(&schema);

        assert_eq!(snapshot.sequence(), SequenceNumber::ZERO);
        assert!(snapshot.index("items", "id").unwrap().is_unique());
        assert!(!snapshot.index("items", "color").unwrap().is_unique());
        assert_eq!(snapshot.len("items").unwrap(), 0);
        assert!(matches!(
            snapshot.index("items", "size"),
            Err(CoreError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn derive_replaces_only_given_stores() {
        let schema = Arc::new(item_schema());
        let base = Snapshot::empty(&schema);

        let key = IndexKey::from("0001");
        let store = base
            .store_at(0, 0)
            .with(key.clone(), &key, Some(Arc::new(Item::new("0001", "red", 1))));
        let next = base.derive(vec![vec![Some(store), None]], SequenceNumber::new(7));

        assert_eq!(next.sequence(), SequenceNumber::new(7));
        assert!(next.get("items", "id", &key).unwrap().is_some());
        assert!(base.get("items", "id", &key).unwrap().is_none());
        assert_eq!(next.index("items", "color").unwrap().len(), 0);
    }
}
