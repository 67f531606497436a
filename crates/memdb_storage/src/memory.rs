//! In-memory entry store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::EntryStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory entry store.
///
/// This store keeps all entries in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Example
///
/// ```rust
/// use memdb_storage::{EntryStore, InMemoryStore};
///
/// let mut store = InMemoryStore::new();
/// store.create("a", b"1").unwrap();
/// assert!(store.create("a", b"2").is_err());
/// assert_eq!(store.len().unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(entries: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries.read().clone()
    }
}

impl EntryStore for InMemoryStore {
    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                name: name.to_string(),
            })
    }

    fn create(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidName {
                name: name.to_string(),
            });
        }

        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(StorageError::EntryExists {
                name: name.to_string(),
            });
        }
        entries.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing is buffered
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.read().len())
    }
}
