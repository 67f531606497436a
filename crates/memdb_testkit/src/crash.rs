//! Crash recovery testing for memdb.
//!
//! This module provides utilities for testing crash recovery behavior.
//! It injects storage failures at chosen points of a commit, damages WAL
//! files on disk, and verifies what a reopened database contains.
//!
//! ## Test Strategy
//!
//! 1. **Crash after commit** - Committed data survives
//! 2. **Crash during a commit** - A partly written batch is discarded
//! 3. **Failed sync** - The commit is reported failed
//! 4. **Damaged entries** - Corruption stops recovery
//! 5. **Leftover files** - Temporary and foreign files are ignored
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memdb_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::with_temp_dir()?;
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::{person, test_schema, Person};
use memdb_core::wal::entry::entry_name;
use memdb_core::{Config, CoreError, CoreResult, Database, SequenceNumber};
use memdb_storage::{DirStore, EntryStore, StorageError, StorageResult};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, records: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }

    fn check(description: &str, expected: usize, actual: usize) -> Self {
        if expected == actual {
            Self::pass(description, actual)
        } else {
            Self::fail(description, expected, actual, "record count mismatch")
        }
    }
}

/// Shared trigger for the failures of a [`CrashableStore`].
#[derive(Debug, Clone)]
pub struct CrashSwitch {
    creates_left: Arc<AtomicUsize>,
    fail_sync: Arc<AtomicBool>,
    crashed: Arc<AtomicBool>,
}

impl CrashSwitch {
    fn new() -> Self {
        Self {
            creates_left: Arc::new(AtomicUsize::new(usize::MAX)),
            fail_sync: Arc::new(AtomicBool::new(false)),
            crashed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Lets `creates` more entries through, then fails every create.
    pub fn crash_after_creates(&self, creates: usize) {
        self.creates_left.store(creates, Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.creates_left.store(usize::MAX, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a failure has been injected.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("simulated crash during {what}")))
    }
}

/// An entry store wrapper that can simulate crashes.
pub struct CrashableStore {
    inner: Box<dyn EntryStore>,
    switch: CrashSwitch,
}

impl CrashableStore {
    /// Creates a new crashable store wrapping an inner store.
    pub fn new(inner: Box<dyn EntryStore>) -> Self {
        Self {
            inner,
            switch: CrashSwitch::new(),
        }
    }

    /// Returns a handle that triggers this store's failures.
    pub fn switch(&self) -> CrashSwitch {
        self.switch.clone()
    }
}

impl EntryStore for CrashableStore {
    fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list()
    }

    fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.inner.read(name)
    }

    fn create(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        let left = self.switch.creates_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(self.switch.crash("create"));
        }
        if left != usize::MAX {
            self.switch.creates_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.create(name, data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.switch.fail_sync.load(Ordering::SeqCst) {
            return Err(self.switch.crash("sync"));
        }
        self.inner.sync()
    }
}

/// Test harness for crash recovery scenarios.
///
/// Each scenario works in its own subdirectory of a temporary directory.
pub struct CrashRecoveryHarness {
    temp_dir: TempDir,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness with a temporary directory.
    pub fn with_temp_dir() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            results: Vec::new(),
        })
    }

    /// Returns the database directory of a scenario.
    pub fn db_path(&self, scenario: &str) -> PathBuf {
        self.temp_dir.path().join(scenario)
    }

    fn open(&self, scenario: &str) -> CoreResult<Database<Person>> {
        Database::open(&self.db_path(scenario), test_schema())
    }

    /// Opens a scenario's database over a [`CrashableStore`].
    pub fn open_crashable(
        &self,
        scenario: &str,
        config: Config,
    ) -> CoreResult<(Database<Person>, CrashSwitch)> {
        let wal = DirStore::open_with_create_dirs(&self.db_path(scenario).join("wal"))?;
        let store = CrashableStore::new(Box::new(wal));
        let switch = store.switch();
        let db = Database::open_with_store(test_schema(), Box::new(store), config)?;
        Ok((db, switch))
    }

    fn entry_path(&self, scenario: &str, sequence: u64) -> PathBuf {
        self.db_path(scenario)
            .join("wal")
            .join(entry_name(SequenceNumber::new(sequence)))
    }

    fn record(
        &mut self,
        description: &str,
        expected: usize,
        result: CoreResult<CrashRecoveryResult>,
    ) -> CrashRecoveryResult {
        let result = result.unwrap_or_else(|e| {
            CrashRecoveryResult::fail(description, expected, 0, &e.to_string())
        });
        self.results.push(result.clone());
        result
    }

    fn populate(db: &Database<Person>, count: u64) -> CoreResult<()> {
        for n in 1..=count {
            db.transaction(|txn| txn.insert("test", person(n)).map(|_| ()))?;
        }
        Ok(())
    }

    fn count(db: &Database<Person>) -> CoreResult<usize> {
        db.read()?.len("test")
    }

    /// Tests that committed data survives a crash.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        let description = "Committed data survives crash";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let db = self.open("committed")?;
            Self::populate(&db, 10)?;
            drop(db);

            let db = self.open("committed")?;
            let txn = db.read()?;
            let mut found = 0;
            for n in 1..=10 {
                if txn.get("test", "id", person(n).id.as_str())?.as_deref() == Some(&person(n)) {
                    found += 1;
                }
            }
            Ok(CrashRecoveryResult::check(description, 10, found))
        })();
        self.record(description, 10, result)
    }

    /// Tests that a commit interrupted part way through its batch is
    /// discarded on recovery, and that the WAL stays usable.
    pub fn test_interrupted_commit_discarded(&mut self) -> CrashRecoveryResult {
        let description = "Interrupted commit discarded";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let (db, switch) = self.open_crashable("interrupted", Config::default())?;
            Self::populate(&db, 3)?;

            switch.crash_after_creates(2);
            let failed = db.transaction(|txn| {
                for n in 10..14 {
                    txn.insert("test", person(n))?;
                }
                Ok(())
            });
            if failed.is_ok() || !switch.has_crashed() {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    3,
                    Self::count(&db)?,
                    "commit did not fail",
                ));
            }
            if Self::count(&db)? != 3 {
                return Ok(CrashRecoveryResult::check(description, 3, Self::count(&db)?));
            }
            drop(db);

            let db = self.open("interrupted")?;
            if Self::count(&db)? != 3 {
                return Ok(CrashRecoveryResult::check(description, 3, Self::count(&db)?));
            }

            // A later commit must survive the discarded batch before it.
            Self::populate(&db, 4)?;
            drop(db);
            let db = self.open("interrupted")?;
            Ok(CrashRecoveryResult::check(description, 4, Self::count(&db)?))
        })();
        self.record(description, 4, result)
    }

    /// Tests that a failed sync fails the commit without publishing it.
    ///
    /// The entries were written before the sync failed, so a reopened
    /// database does contain the commit.
    pub fn test_failed_sync_reported(&mut self) -> CrashRecoveryResult {
        let description = "Failed sync reported";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let config = Config::new().sync_on_commit(true);
            let (db, switch) = self.open_crashable("sync", config)?;
            Self::populate(&db, 2)?;

            switch.set_fail_on_sync(true);
            let failed = db.transaction(|txn| txn.insert("test", person(3)).map(|_| ()));
            if !matches!(failed, Err(CoreError::Storage(_))) || Self::count(&db)? != 2 {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    2,
                    Self::count(&db)?,
                    "failed sync was not reported",
                ));
            }
            drop(db);

            let db = self.open("sync")?;
            Ok(CrashRecoveryResult::check(description, 3, Self::count(&db)?))
        })();
        self.record(description, 3, result)
    }

    /// Tests that a damaged entry makes recovery fail with a checksum error.
    pub fn test_corrupt_entry_detected(&mut self) -> CrashRecoveryResult {
        let description = "Corrupt entry detected";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let db = self.open("corrupt")?;
            Self::populate(&db, 3)?;
            drop(db);

            let path = self.entry_path("corrupt", 2);
            let mut data = fs::read(&path)?;
            let mid = data.len() / 2;
            data[mid] ^= 0xff;
            fs::write(&path, data)?;

            match self.open("corrupt") {
                Err(CoreError::ChecksumMismatch { .. }) => {
                    Ok(CrashRecoveryResult::pass(description, 0))
                }
                Err(e) => Ok(CrashRecoveryResult::fail(description, 0, 0, &e.to_string())),
                Ok(db) => Ok(CrashRecoveryResult::fail(
                    description,
                    0,
                    Self::count(&db)?,
                    "corruption went unnoticed",
                )),
            }
        })();
        self.record(description, 0, result)
    }

    /// Tests that a truncated entry makes recovery fail.
    pub fn test_truncated_entry_detected(&mut self) -> CrashRecoveryResult {
        let description = "Truncated entry detected";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let db = self.open("truncated")?;
            Self::populate(&db, 2)?;
            drop(db);

            let path = self.entry_path("truncated", 2);
            let data = fs::read(&path)?;
            fs::write(&path, &data[..data.len() / 2])?;

            match self.open("truncated") {
                Err(e) if e.is_storage() => Ok(CrashRecoveryResult::pass(description, 0)),
                Err(e) => Ok(CrashRecoveryResult::fail(description, 0, 0, &e.to_string())),
                Ok(db) => Ok(CrashRecoveryResult::fail(
                    description,
                    0,
                    Self::count(&db)?,
                    "truncation went unnoticed",
                )),
            }
        })();
        self.record(description, 0, result)
    }

    /// Tests that temporary and foreign files in the WAL directory are
    /// ignored.
    pub fn test_leftover_files_ignored(&mut self) -> CrashRecoveryResult {
        let description = "Leftover files ignored";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let db = self.open("leftover")?;
            Self::populate(&db, 2)?;
            drop(db);

            let wal = self.db_path("leftover").join("wal");
            let tmp = wal.join(format!("{}.tmp", entry_name(SequenceNumber::new(3))));
            fs::write(&tmp, b"half written")?;
            fs::write(wal.join("NOTES"), b"not an entry")?;

            let db = self.open("leftover")?;
            if tmp.exists() {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    2,
                    Self::count(&db)?,
                    "temporary file survived open",
                ));
            }
            Self::populate(&db, 3)?;
            Ok(CrashRecoveryResult::check(description, 3, Self::count(&db)?))
        })();
        self.record(description, 3, result)
    }

    /// Tests that deletes survive a crash.
    pub fn test_delete_survives_crash(&mut self) -> CrashRecoveryResult {
        let description = "Delete survives crash";
        let result = (|| -> CoreResult<CrashRecoveryResult> {
            let db = self.open("delete")?;
            Self::populate(&db, 3)?;
            db.transaction(|txn| txn.delete_key("test", person(2).id.as_str()))?;
            drop(db);

            let db = self.open("delete")?;
            if db.read()?.get("test", "id", person(2).id.as_str())?.is_some() {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    2,
                    Self::count(&db)?,
                    "deleted record came back",
                ));
            }
            Ok(CrashRecoveryResult::check(description, 2, Self::count(&db)?))
        })();
        self.record(description, 2, result)
    }

    /// Runs all crash recovery tests.
    pub fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        self.results.clear();

        self.test_committed_data_survives();
        self.test_interrupted_commit_discarded();
        self.test_failed_sync_reported();
        self.test_corrupt_entry_detected();
        self.test_truncated_entry_detected();
        self.test_leftover_files_ignored();
        self.test_delete_survives_crash();

        self.results.clone()
    }

    /// Returns a summary of test results.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let total = self.results.len();

        let mut summary = format!(
            "\n=== Crash Recovery Test Summary ===\n\
             Passed: {}/{}\n\n",
            passed, total
        );

        for result in &self.results {
            let status = if result.passed { "ok" } else { "FAILED" };
            summary.push_str(&format!(
                "{} {}\n  Expected: {} records, Actual: {} records\n",
                status, result.description, result.expected_records, result.actual_records
            ));
            if let Some(ref error) = result.error {
                summary.push_str(&format!("  Error: {}\n", error));
            }
        }

        summary
    }

    /// Returns whether all tests passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdb_storage::InMemoryStore;

    #[test]
    fn test_crashable_store_normal_operation() {
        let mut store = CrashableStore::new(Box::new(InMemoryStore::new()));
        store.create("a", b"test data").unwrap();
        store.sync().unwrap();
        assert_eq!(store.read("a").unwrap(), b"test data");
        assert!(!store.switch().has_crashed());
    }

    #[test]
    fn test_crashable_store_crash_on_create() {
        let mut store = CrashableStore::new(Box::new(InMemoryStore::new()));
        let switch = store.switch();
        switch.crash_after_creates(1);

        store.create("a", b"1").unwrap();
        assert!(store.create("b", b"2").is_err());
        assert!(switch.has_crashed());
        assert_eq!(store.list().unwrap(), vec!["a".to_string()]);

        switch.reset();
        store.create("b", b"2").unwrap();
    }

    #[test]
    fn test_crashable_store_crash_on_sync() {
        let mut store = CrashableStore::new(Box::new(InMemoryStore::new()));
        store.switch().set_fail_on_sync(true);
        assert!(store.sync().is_err());
        assert!(store.flush().is_ok());
    }

    #[test]
    fn test_crash_recovery_harness() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        let result = harness.test_committed_data_survives();
        assert!(result.passed, "{:?}", result);
    }

    #[test]
    fn test_all_crash_recovery_scenarios() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();

        let results = harness.run_all_tests();
        assert_eq!(results.len(), 7);
        println!("{}", harness.summary());

        assert!(harness.all_passed(), "Some crash recovery tests failed");
    }
}
