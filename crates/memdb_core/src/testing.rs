//! Shared fixtures for unit tests.

use crate::schema::{DBSchema, FieldValue, IndexSchema, Indexer, Record, TableSchema};
use memdb_codec::CborCodec;
use memdb_storage::{EntryStore, StorageError, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Item {
    pub(crate) id: String,
    pub(crate) color: String,
    pub(crate) qty: u64,
}

impl Item {
    pub(crate) fn new(id: &str, color: &str, qty: u64) -> Self {
        Self {
            id: id.to_string(),
            color: color.to_string(),
            qty,
        }
    }
}

impl Record for Item {
    const FIELDS: &'static [&'static str] = &["ID", "Color", "Qty"];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "ID" => Some(FieldValue::Str(&self.id)),
            "Color" => Some(FieldValue::Str(&self.color)),
            "Qty" => Some(FieldValue::Uint(self.qty)),
            _ => None,
        }
    }
}

/// `items`: unique `id` on ID, non-unique `color` on Color.
pub(crate) fn item_table() -> TableSchema<Item> {
    TableSchema::new("items", CborCodec::<Item>::new())
        .index(IndexSchema::unique("id", Indexer::field("ID")))
        .index(IndexSchema::non_unique("color", Indexer::field("Color")))
}

pub(crate) fn item_schema() -> DBSchema<Item> {
    DBSchema::builder()
        .table(item_table())
        .build()
        .expect("item schema is valid")
}

/// In-memory entry store whose clones share state, with injectable
/// create failures.
#[derive(Clone)]
pub(crate) struct FaultyStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    /// Creates allowed before failing. `usize::MAX` never fails.
    budget: Arc<AtomicUsize>,
    syncs: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::default(),
            budget: Arc::new(AtomicUsize::new(usize::MAX)),
            syncs: Arc::default(),
        }
    }

    pub(crate) fn fail_after(&self, creates: usize) {
        self.budget.store(creates, Ordering::SeqCst);
    }

    pub(crate) fn heal(&self) {
        self.budget.store(usize::MAX, Ordering::SeqCst);
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub(crate) fn get_raw(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.read().get(name).cloned()
    }

    pub(crate) fn put_raw(&self, name: &str, data: Vec<u8>) {
        self.entries.write().insert(name.to_string(), data);
    }

    pub(crate) fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

impl EntryStore for FaultyStore {
    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.names())
    }

    fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.get_raw(name)
            .ok_or_else(|| StorageError::EntryNotFound {
                name: name.to_string(),
            })
    }

    fn create(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        let budget = self.budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(StorageError::Io(io::Error::other("injected create failure")));
        }
        if budget != usize::MAX {
            self.budget.store(budget - 1, Ordering::SeqCst);
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
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
