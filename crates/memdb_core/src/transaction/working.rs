//! Copy-on-write working state shared by write transactions and replay.

use super::Change;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexStore;
use crate::schema::Record;
use crate::snapshot::Snapshot;
use crate::types::{IndexKey, SequenceNumber};
use std::sync::Arc;

/// Index stores modified relative to a base snapshot.
///
/// A store is cloned from the base the first time it is touched (an O(1)
/// root clone) and then mutated in place; untouched stores stay shared.
pub(crate) struct WorkingSet<R> {
    base: Arc<Snapshot<R>>,
    stores: Vec<Vec<Option<IndexStore<R>>>>,
}

impl<R: Record> WorkingSet<R> {
    pub(crate) fn new(base: Arc<Snapshot<R>>) -> Self {
        let stores = base
            .schema()
            .tables()
            .iter()
            .map(|table| vec![None; table.indexes().len()])
            .collect();
        Self { base, stores }
    }

    pub(crate) fn base(&self) -> &Arc<Snapshot<R>> {
        &self.base
    }

    pub(crate) fn store(&self, table: usize, index: usize) -> &IndexStore<R> {
        self.stores[table][index]
            .as_ref()
            .unwrap_or_else(|| self.base.store_at(table, index))
    }

    fn store_mut(&mut self, table: usize, index: usize) -> &mut IndexStore<R> {
        let base = &self.base;
        self.stores[table][index].get_or_insert_with(|| base.store_at(table, index).clone())
    }

    /// Writes `record` to every index of `table` and returns its primary key.
    ///
    /// All keys are extracted before anything is modified, so a failure
    /// leaves the working set unchanged. A record already stored under the
    /// same primary key is replaced, including its secondary entries.
    pub(crate) fn insert(&mut self, table: usize, record: Arc<R>) -> CoreResult<IndexKey> {
        let schema = Arc::clone(self.base.schema());
        let table_schema = schema.table_at(table);

        let keys = table_schema
            .indexes()
            .iter()
            .map(|index| {
                index.indexer().extract(&record).ok_or_else(|| {
                    CoreError::index_key(table_schema.name(), index.name(), "record has no key")
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let primary = keys[table_schema.primary_position()].clone();

        for (pos, index) in table_schema.indexes().iter().enumerate() {
            if !index.rejects_collisions() {
                continue;
            }
            if let Some((holder, _)) = self.store(table, pos).holder(&keys[pos]) {
                if holder != primary {
                    return Err(CoreError::UniqueViolation {
                        table: table_schema.name().to_string(),
                        index: index.name().to_string(),
                        key: format!("{:?}", keys[pos]),
                    });
                }
            }
        }

        self.delete_key(table, &primary);
        for (pos, key) in keys.into_iter().enumerate() {
            self.store_mut(table, pos)
                .insert(key, &primary, Arc::clone(&record));
        }
        Ok(primary)
    }

    /// Removes the record stored under `primary` from every index of
    /// `table`. Returns false if there was no such record.
    pub(crate) fn delete_key(&mut self, table: usize, primary: &IndexKey) -> bool {
        let schema = Arc::clone(self.base.schema());
        let table_schema = schema.table_at(table);
        let primary_pos = table_schema.primary_position();

        let Some(existing) = self.store(table, primary_pos).get(primary) else {
            return false;
        };

        for (pos, index) in table_schema.indexes().iter().enumerate() {
            let key = if pos == primary_pos {
                Some(primary.clone())
            } else {
                index.indexer().extract(&existing)
            };
            if let Some(key) = key {
                self.store_mut(table, pos).remove(&key, primary);
            }
        }
        true
    }

    /// Applies a change produced by a transaction or read from the WAL.
    pub(crate) fn apply(&mut self, change: &Change<R>) -> CoreResult<()> {
        let table = self.base.schema().table_id(change.table())?;
        match change.record() {
            Some(record) => {
                self.insert(table, Arc::clone(record))?;
            }
            None => {
                self.delete_key(table, change.primary_key());
            }
        }
        Ok(())
    }

    pub(crate) fn into_snapshot(self, sequence: SequenceNumber) -> Snapshot<R> {
        self.base.derive(self.stores, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{item_schema, Item};

    fn working() -> WorkingSet<Item> {
        WorkingSet::new(Arc::new(Snapshot::empty(&Arc::new(item_schema()))))
    }

    fn color_keys(work: &WorkingSet<Item>) -> Vec<(String, String)> {
        work.store(0, 1)
            .iter()
            .map(|(key, item)| {
                (
                    String::from_utf8_lossy(key.as_bytes()).into_owned(),
                    item.id.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn untouched_stores_are_shared() {
        let work = working();
        assert!(work.stores.iter().flatten().all(Option::is_none));
        assert_eq!(work.store(0, 0).len(), 0);
    }

    #[test]
    fn insert_writes_every_index() {
        let mut work = working();
        let pk = work.insert(0, Arc::new(Item::new("0001", "red", 1))).unwrap();

        assert_eq!(pk, IndexKey::from("0001"));
        assert_eq!(work.store(0, 0).len(), 1);
        assert_eq!(color_keys(&work), vec![("red".into(), "0001".into())]);
    }

    #[test]
    fn reinsert_moves_secondary_entries() {
        let mut work = working();
        work.insert(0, Arc::new(Item::new("0001", "red", 1))).unwrap();
        work.insert(0, Arc::new(Item::new("0001", "blue", 2))).unwrap();

        assert_eq!(work.store(0, 0).len(), 1);
        assert_eq!(color_keys(&work), vec![("blue".into(), "0001".into())]);
    }

    #[test]
    fn delete_key_removes_everywhere() {
        let mut work = working();
        work.insert(0, Arc::new(Item::new("0001", "red", 1))).unwrap();
        work.insert(0, Arc::new(Item::new("0002", "red", 1))).unwrap();

        assert!(work.delete_key(0, &IndexKey::from("0001")));
        assert!(!work.delete_key(0, &IndexKey::from("0001")));

        assert_eq!(work.store(0, 0).len(), 1);
        assert_eq!(color_keys(&work), vec![("red".into(), "0002".into())]);
    }

    #[test]
    fn base_is_never_modified() {
        let mut work = working();
        let base = Arc::clone(work.base());
        work.insert(0, Arc::new(Item::new("0001", "red", 1))).unwrap();

        let next = work.into_snapshot(SequenceNumber::new(1));
        assert_eq!(base.len("items").unwrap(), 0);
        assert_eq!(next.len("items").unwrap(), 1);
    }

    #[test]
    fn apply_replays_changes() {
        let mut work = working();
        let item = Arc::new(Item::new("0001", "red", 1));
        work.apply(&Change::insert("items", IndexKey::from("0001"), item))
            .unwrap();
        work.apply(&Change::delete("items", IndexKey::from("0001")))
            .unwrap();
        work.apply(&Change::delete("items", IndexKey::from("0009")))
            .unwrap();

        assert_eq!(work.store(0, 0).len(), 0);
        assert!(matches!(
            work.apply(&Change::delete("nope", IndexKey::from("1"))),
            Err(CoreError::UnknownTable { .. })
        ));
    }
}
