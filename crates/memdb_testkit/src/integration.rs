//! Cross-crate integration test helpers.
//!
//! Provides a tracking harness and reusable checks that drive a real
//! directory-backed database through storage, codec and core together.

use crate::fixtures::{person, Person, TestDatabase};
use crate::generators::{apply_commit, Operation};
use memdb_core::{Database, IndexKey, Record, Snapshot};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Contents of one index: table name, index name, entries in order.
pub type IndexDump<R> = (String, String, Vec<(IndexKey, Arc<R>)>);

/// Returns every index of every table in `snapshot`, in schema order.
pub fn dump_snapshot<R: Record>(snapshot: &Snapshot<R>) -> Vec<IndexDump<R>> {
    let mut out = Vec::new();
    for table in snapshot.schema().tables() {
        for index in table.indexes() {
            let entries = snapshot
                .iter(table.name(), index.name())
                .expect("schema names resolve")
                .collect();
            out.push((table.name().to_string(), index.name().to_string(), entries));
        }
    }
    out
}

/// Asserts that every index iterates in ascending key order, strictly so
/// for unique indexes.
pub fn assert_ordered<R: Record>(snapshot: &Snapshot<R>) {
    for table in snapshot.schema().tables() {
        for index in table.indexes() {
            let keys: Vec<IndexKey> = snapshot
                .iter(table.name(), index.name())
                .expect("schema names resolve")
                .map(|(key, _)| key)
                .collect();
            for pair in keys.windows(2) {
                if index.is_unique() {
                    assert!(
                        pair[0] < pair[1],
                        "{}.{} out of order: {:?} then {:?}",
                        table.name(),
                        index.name(),
                        pair[0],
                        pair[1]
                    );
                } else {
                    assert!(pair[0] <= pair[1]);
                }
            }
        }
    }
}

/// A test harness that mirrors every commit into a model.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestDatabase,
    expected: BTreeMap<String, Person>,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh directory-backed database.
    pub fn new() -> Self {
        Self {
            db: TestDatabase::new(),
            expected: BTreeMap::new(),
        }
    }

    /// Applies one commit and updates the model.
    pub fn commit(&mut self, ops: &[Operation]) {
        apply_commit(&self.db, ops).expect("Failed to commit");
        for op in ops {
            match op {
                Operation::Insert(person) => {
                    self.expected.insert(person.id.clone(), person.clone());
                }
                Operation::Delete(id) => {
                    self.expected.remove(id);
                }
            }
        }
    }

    /// Inserts a person in a commit of its own.
    pub fn insert(&mut self, person: Person) {
        self.commit(&[Operation::Insert(person)]);
    }

    /// Deletes a key in a commit of its own.
    pub fn delete(&mut self, id: &str) {
        self.commit(&[Operation::Delete(id.to_string())]);
    }

    /// Verifies the database holds exactly the tracked records.
    pub fn verify_all(&self) {
        let txn = self.db.read().expect("Failed to begin read");
        assert_eq!(txn.len("test").expect("table exists"), self.expected.len());
        for (id, expected) in &self.expected {
            let actual = txn
                .get("test", "id", id.as_str())
                .expect("table exists")
                .unwrap_or_else(|| panic!("missing record {id}"));
            assert_eq!(&*actual, expected, "record mismatch for {id}");
        }
        assert_ordered(txn.snapshot());
    }

    /// Reopens the database from its WAL and verifies it again.
    pub fn reopen_and_verify(&mut self) {
        let before = dump_snapshot(&self.db.snapshot());
        self.db.reopen();
        let after = dump_snapshot(&self.db.snapshot());
        assert_eq!(before, after, "replay changed the database");
        self.verify_all();
    }

    /// Returns the number of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Isolation checks.
pub mod isolation {
    use super::*;

    /// Verifies that a reader opened before a commit never sees it.
    pub fn test_snapshot_isolation(db: &Database<Person>) {
        db.transaction(|txn| txn.insert("test", person(1)).map(|_| ()))
            .expect("Failed to seed");

        let reader = db.read().expect("Failed to begin read");
        let before = dump_snapshot(reader.snapshot());

        db.transaction(|txn| {
            txn.insert("test", Person::new("0001", "Renamed", 99))?;
            txn.insert("test", person(2))?;
            txn.delete_key("test", "0001")?;
            txn.insert("test", person(3))
        })
        .expect("Failed to commit");

        assert_eq!(dump_snapshot(reader.snapshot()), before);
        assert_eq!(reader.len("test").expect("table exists"), 1);
        reader.commit();

        let after = db.read().expect("Failed to begin read");
        assert_eq!(after.len("test").expect("table exists"), 2);
    }

    /// Verifies that a write transaction's changes stay private until
    /// commit and vanish when it is dropped.
    pub fn test_uncommitted_invisible(db: &Database<Person>) {
        let mut txn = db.write().expect("Failed to begin write");
        txn.insert("test", person(42)).expect("Failed to insert");
        assert!(txn.get("test", "id", "0042").expect("table exists").is_some());

        let reader = db.read().expect("Failed to begin read");
        assert!(reader.get("test", "id", "0042").expect("table exists").is_none());
        drop(txn);

        let reader = db.read().expect("Failed to begin read");
        assert!(reader.get("test", "id", "0042").expect("table exists").is_none());
    }
}

/// Idempotence checks.
pub mod idempotence {
    use super::*;

    /// Verifies that inserting the same record twice leaves one entry in
    /// every index.
    pub fn test_upsert_idempotence(db: &Database<Person>) {
        let p = person(5);
        db.transaction(|txn| txn.insert("test", p.clone()).map(|_| ()))
            .expect("Failed to insert");
        let once = dump_snapshot(&db.snapshot());

        db.transaction(|txn| txn.insert("test", p.clone()).map(|_| ()))
            .expect("Failed to insert");
        let twice = dump_snapshot(&db.snapshot());

        assert_eq!(once, twice);
        for (_, _, entries) in &twice {
            assert_eq!(entries.len(), 1);
        }
    }

    /// Verifies that deleting an absent key changes no index.
    pub fn test_delete_idempotence(db: &Database<Person>) {
        db.transaction(|txn| txn.insert("test", person(1)).map(|_| ()))
            .expect("Failed to insert");
        let before = dump_snapshot(&db.snapshot());

        db.transaction(|txn| txn.delete_key("test", "0999"))
            .expect("Failed to delete");
        assert_eq!(dump_snapshot(&db.snapshot()), before);
    }
}

/// Replay checks against a reopenable database.
pub mod replay {
    use super::*;

    fn ids(db: &Database<Person>) -> Vec<String> {
        db.read()
            .expect("Failed to begin read")
            .iter("test", "id")
            .expect("table exists")
            .map(|(_, p)| p.id.clone())
            .collect()
    }

    /// Three inserts and a delete in four commits, then a reopen.
    pub fn test_insert_delete_reopen(test_db: &mut TestDatabase) {
        for n in 1..=3 {
            test_db
                .transaction(|txn| txn.insert("test", person(n)).map(|_| ()))
                .expect("Failed to insert");
        }
        test_db
            .transaction(|txn| txn.delete_key("test", "0002"))
            .expect("Failed to delete");
        assert_eq!(ids(test_db), vec!["0001", "0003"]);

        let db = test_db.reopen();
        assert_eq!(ids(db), vec!["0001", "0003"]);
    }

    /// Insert-then-delete leaves the key absent after replay, and
    /// delete-then-insert leaves the later value.
    pub fn test_tombstone_ordering(test_db: &mut TestDatabase) {
        test_db
            .transaction(|txn| txn.insert("test", person(1)).map(|_| ()))
            .expect("Failed to insert");
        test_db
            .transaction(|txn| txn.delete_key("test", "0001"))
            .expect("Failed to delete");

        test_db
            .transaction(|txn| txn.insert("test", person(2)).map(|_| ()))
            .expect("Failed to insert");
        test_db
            .transaction(|txn| txn.delete_key("test", "0002"))
            .expect("Failed to delete");
        let later = Person::new("0002", "Later", 77);
        test_db
            .transaction(|txn| txn.insert("test", later.clone()).map(|_| ()))
            .expect("Failed to insert");

        let db = test_db.reopen();
        let txn = db.read().expect("Failed to begin read");
        assert!(txn.get("test", "id", "0001").expect("table exists").is_none());
        let found = txn.get("test", "id", "0002").expect("table exists");
        assert_eq!(found.as_deref(), Some(&later));
        assert_eq!(txn.get_all("test", "age", 77u64).expect("index exists").len(), 1);
    }
}
