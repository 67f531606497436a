//! Per-index ordered record stores.

use super::tree::{self, PersistentMap};
use crate::types::IndexKey;
use std::fmt;
use std::sync::Arc;

/// Position of one record in an index.
///
/// Unique indexes leave `primary` empty so each index key has one slot.
/// Non-unique indexes put the record's primary key there, which orders
/// records sharing an index key by primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey {
    key: IndexKey,
    primary: IndexKey,
}

struct Slot<R> {
    primary: IndexKey,
    record: Arc<R>,
}

impl<R> Clone for Slot<R> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            record: Arc::clone(&self.record),
        }
    }
}

/// Ordered mapping from index keys to records for one (table, index) pair.
///
/// Stores are immutable once published in a snapshot. [`IndexStore::with`]
/// and [`IndexStore::without`] produce new versions that share structure
/// with the original; the in-place `insert`/`remove` are for private
/// working copies.
pub struct IndexStore<R> {
    entries: PersistentMap<EntryKey, Slot<R>>,
    unique: bool,
}

impl<R> IndexStore<R> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(unique: bool) -> Self {
        Self {
            entries: PersistentMap::new(),
            unique,
        }
    }

    /// Returns true if each key maps to at most one record.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the number of records in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all records in ascending key order.
    #[must_use]
    pub fn iter(&self) -> IndexIter<R> {
        IndexIter {
            inner: self.entries.iter(),
        }
    }

    fn slot_key(&self, key: IndexKey, primary: &IndexKey) -> EntryKey {
        EntryKey {
            key,
            primary: if self.unique {
                IndexKey::empty()
            } else {
                primary.clone()
            },
        }
    }

    /// Returns the record stored under `key`.
    ///
    /// For non-unique indexes this is the record with the smallest primary
    /// key among those sharing `key`.
    #[must_use]
    pub fn get(&self, key: &IndexKey) -> Option<Arc<R>> {
        self.holder(key).map(|(_, record)| record)
    }

    /// Returns every record stored under `key`, ordered by primary key.
    #[must_use]
    pub fn get_all(&self, key: &IndexKey) -> Vec<Arc<R>> {
        self.iter_from(key)
            .take_while(|(k, _)| k == key)
            .map(|(_, record)| record)
            .collect()
    }

    /// Iterates over records with keys at or after `from`, ascending.
    #[must_use]
    pub fn iter_from(&self, from: &IndexKey) -> IndexIter<R> {
        let start = EntryKey {
            key: from.clone(),
            primary: IndexKey::empty(),
        };
        IndexIter {
            inner: self.entries.iter_from(&start),
        }
    }

    /// Returns the primary key and record holding `key`.
    pub(crate) fn holder(&self, key: &IndexKey) -> Option<(IndexKey, Arc<R>)> {
        let (entry, slot) = self.entries.iter_from(&EntryKey {
            key: key.clone(),
            primary: IndexKey::empty(),
        })
        .next()?;
        (entry.key == *key).then_some((slot.primary, slot.record))
    }

    /// Stores `record` under `key`, replacing whatever held the slot.
    pub fn insert(&mut self, key: IndexKey, primary: &IndexKey, record: Arc<R>) {
        let entry = self.slot_key(key, primary);
        self.entries.insert(
            entry,
            Slot {
                primary: primary.clone(),
                record,
            },
        );
    }

    /// Removes the entry for `key` if it belongs to the record identified
    /// by `primary`. Returns the removed record.
    ///
    /// A unique slot taken over by another record is left alone, as is an
    /// absent key.
    pub fn remove(&mut self, key: &IndexKey, primary: &IndexKey) -> Option<Arc<R>> {
        let entry = self.slot_key(key.clone(), primary);
        match self.entries.get(&entry) {
            Some(slot) if slot.primary == *primary => {
                self.entries.remove(&entry).map(|slot| slot.record)
            }
            _ => None,
        }
    }

    /// Returns a new store with `key` set to `record`, or removed when
    /// `record` is `None`. `self` is left untouched.
    #[must_use]
    pub fn with(&self, key: IndexKey, primary: &IndexKey, record: Option<Arc<R>>) -> Self {
        let mut next = self.clone();
        match record {
            Some(record) => next.insert(key, primary, record),
            None => {
                next.remove(&key, primary);
            }
        }
        next
    }
}

impl<R> Clone for IndexStore<R> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            unique: self.unique,
        }
    }
}

impl<R> fmt::Debug for IndexStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexStore")
            .field("unique", &self.unique)
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Lazy ascending iterator over an index, yielding `(key, record)` pairs.
///
/// It reads the version of the index it was created from, whatever happens
/// to the database afterwards. Clone it to restart from the same position.
pub struct IndexIter<R> {
    inner: tree::Iter<EntryKey, Slot<R>>,
}

impl<R> Iterator for IndexIter<R> {
    type Item = (IndexKey, Arc<R>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(entry, slot)| (entry.key, slot.record))
    }
}

impl<R> Clone for IndexIter<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(s: &str) -> Arc<String> {
        Arc::new(s.to_string())
    }

    fn key(s: &str) -> IndexKey {
        IndexKey::from(s)
    }

    fn keys<R>(store: &IndexStore<R>) -> Vec<IndexKey> {
        store.iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn unique_upsert_replaces() {
        let mut store = IndexStore::new(true);
        store.insert(key("a"), &key("a"), rec("first"));
        store.insert(key("a"), &key("a"), rec("second"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key("a")).as_deref(), Some(&"second".to_string()));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut store: IndexStore<String> = IndexStore::new(true);
        store.insert(key("a"), &key("a"), rec("x"));

        assert!(store.remove(&key("zzz"), &key("zzz")).is_none());
        assert_eq!(keys(&store), vec![key("a")]);
    }

    #[test]
    fn unique_slot_taken_over_is_not_removed_by_old_owner() {
        let mut store = IndexStore::new(true);
        store.insert(key("mail"), &key("p1"), rec("one"));
        store.insert(key("mail"), &key("p2"), rec("two"));

        assert!(store.remove(&key("mail"), &key("p1")).is_none());
        assert_eq!(store.holder(&key("mail")).map(|(p, _)| p), Some(key("p2")));

        assert!(store.remove(&key("mail"), &key("p2")).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn non_unique_keeps_every_record() {
        let mut store = IndexStore::new(false);
        store.insert(key("red"), &key("3"), rec("c"));
        store.insert(key("red"), &key("1"), rec("a"));
        store.insert(key("blue"), &key("2"), rec("b"));

        assert_eq!(store.len(), 3);
        let reds: Vec<String> = store
            .get_all(&key("red"))
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(reds, vec!["a", "c"]);
        assert_eq!(store.get(&key("red")).as_deref(), Some(&"a".to_string()));
        assert!(store.get_all(&key("green")).is_empty());

        store.remove(&key("red"), &key("1"));
        assert_eq!(store.get_all(&key("red")).len(), 1);
    }

    #[test]
    fn iteration_is_ordered_and_seekable() {
        let mut store = IndexStore::new(true);
        for k in ["0003", "0001", "0002"] {
            store.insert(key(k), &key(k), rec(k));
        }

        assert_eq!(keys(&store), vec![key("0001"), key("0002"), key("0003")]);
        let tail: Vec<_> = store.iter_from(&key("0002")).map(|(k, _)| k).collect();
        assert_eq!(tail, vec![key("0002"), key("0003")]);
    }

    #[test]
    fn with_is_copy_on_write() {
        let base: IndexStore<String> = IndexStore::new(true).with(key("a"), &key("a"), Some(rec("a")));
        let added = base.with(key("b"), &key("b"), Some(rec("b")));
        let removed = added.with(key("a"), &key("a"), None);

        assert_eq!(keys(&base), vec![key("a")]);
        assert_eq!(keys(&added), vec![key("a"), key("b")]);
        assert_eq!(keys(&removed), vec![key("b")]);
    }

    #[test]
    fn iterator_restarts_by_clone() {
        let mut store = IndexStore::new(true);
        for k in ["a", "b", "c"] {
            store.insert(key(k), &key(k), rec(k));
        }
        let iter = store.iter();
        let first: Vec<_> = iter.clone().map(|(k, _)| k).collect();
        store.remove(&key("b"), &key("b"));
        let second: Vec<_> = iter.map(|(k, _)| k).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
