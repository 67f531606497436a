//! Database facade and recovery.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::schema::{DBSchema, Record};
use crate::snapshot::Snapshot;
use crate::transaction::{
    Change, CommitInfo, ReadTxn, TransactionManager, Txn, WorkingSet, WriteTxn,
};
use crate::types::SequenceNumber;
use crate::wal::Wal;
use memdb_storage::{DirStore, EntryStore, InMemoryStore};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// The main database handle.
///
/// A `Database` holds the current snapshot of every table and the WAL that
/// makes commits durable. All reads go through transactions:
///
/// ```rust,ignore
/// use memdb_core::Database;
///
/// let db = Database::open(Path::new("my_database"), schema)?;
///
/// let mut txn = db.write()?;
/// txn.insert("items", item)?;
/// txn.commit()?;
///
/// let txn = db.read()?;
/// let found = txn.get("items", "id", "0001")?;
/// ```
///
/// Read transactions never block and never see later commits. Write
/// transactions run concurrently and are serialized at commit.
///
/// # In-Memory Databases
///
/// `Database::open_in_memory()` keeps the WAL in memory. Nothing survives
/// the handle.
pub struct Database<R: Record> {
    /// Configuration.
    config: Config,
    /// Database directory (holds the lock). None for store-backed databases.
    dir: Option<DatabaseDir>,
    schema: Arc<DBSchema<R>>,
    txn_manager: TransactionManager<R>,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl<R: Record> Database<R> {
    /// Opens a database from a directory path.
    ///
    /// Creates the directory if needed, takes an exclusive lock on it, and
    /// rebuilds every table by replaying the WAL.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle has the database locked (`DatabaseLocked`)
    /// - The WAL is corrupt or names a table the schema lacks
    /// - I/O errors occur
    pub fn open(path: &Path, schema: DBSchema<R>) -> CoreResult<Self> {
        Self::open_with_config(path, schema, Config::default())
    }

    /// Opens a database from a directory path with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::default().sync_on_commit(true);
    /// let db = Database::open_with_config(Path::new("my_database"), schema, config)?;
    /// ```
    ///
    /// # Errors
    ///
    /// As [`Database::open`], plus `InvalidFormat` when the database is
    /// missing and `create_if_missing` is false, or exists and
    /// `error_if_exists` is true.
    pub fn open_with_config(path: &Path, schema: DBSchema<R>, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let is_new = dir.is_new_database()?;

        if !config.create_if_missing && is_new {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }
        if config.error_if_exists && !is_new {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let store = DirStore::open_with_create_dirs(&dir.wal_path())?;
        let mut db = Self::open_with_store(schema, Box::new(store), config)?;
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens a database whose WAL lives in the given entry store.
    ///
    /// This is the lower-level constructor behind the other `open`
    /// functions. No directory lock is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the WAL cannot be
    /// replayed.
    pub fn open_with_store(
        schema: DBSchema<R>,
        store: Box<dyn EntryStore>,
        config: Config,
    ) -> CoreResult<Self> {
        let schema = Arc::new(schema);
        let wal = Wal::open(store, config.sync_on_commit)?;
        let snapshot = Self::recover(&wal, &schema)?;

        Ok(Self {
            config,
            dir: None,
            schema,
            txn_manager: TransactionManager::new(snapshot, wal),
            is_open: RwLock::new(true),
        })
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error only if the schema cannot be used.
    pub fn open_in_memory(schema: DBSchema<R>) -> CoreResult<Self> {
        Self::open_with_store(schema, Box::new(InMemoryStore::new()), Config::default())
    }

    /// Rebuilds the tables from the WAL.
    fn recover(wal: &Wal, schema: &Arc<DBSchema<R>>) -> CoreResult<Snapshot<R>> {
        let start = Instant::now();
        let mut work = WorkingSet::new(Arc::new(Snapshot::empty(schema)));
        let mut replay = wal.replay(schema)?;
        let mut replayed = 0usize;

        for change in replay.by_ref() {
            work.apply(&change?)?;
            replayed += 1;
        }

        let sequence = replay.last_sequence();
        info!(
            replayed,
            discarded_batches = replay.discarded_batches(),
            sequence = sequence.as_u64(),
            next_sequence = wal.next_sequence().as_u64(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "recovered database from WAL"
        );
        Ok(work.into_snapshot(sequence))
    }

    /// Begins a read-only transaction on the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn read(&self) -> CoreResult<ReadTxn<R>> {
        self.ensure_open()?;
        Ok(ReadTxn::new(self.txn_manager.snapshot()))
    }

    /// Begins a read-write transaction on the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn write(&self) -> CoreResult<WriteTxn<'_, R>> {
        self.ensure_open()?;
        Ok(WriteTxn::new(self, self.txn_manager.snapshot()))
    }

    /// Begins a transaction of either kind.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn txn(&self, write: bool) -> CoreResult<Txn<'_, R>> {
        if write {
            self.write().map(Txn::Write)
        } else {
            self.read().map(Txn::Read)
        }
    }

    /// Runs `f` in a write transaction and commits it if `f` succeeds.
    ///
    /// If `f` returns an error the transaction is discarded.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` or from the commit.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_, R>) -> CoreResult<T>,
    {
        let mut txn = self.write()?;
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot<R>> {
        self.txn_manager.snapshot()
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<DBSchema<R>> {
        &self.schema
    }

    /// Returns the sequence number of the last committed change.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.txn_manager.snapshot().sequence()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the database directory, if opened from a path.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Closes the database.
    ///
    /// Syncs the WAL and refuses any further transactions. Transactions
    /// already begun can still read; their commits fail with
    /// `DatabaseClosed`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL sync fails. The database stays open.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }

        self.txn_manager.wal().sync()?;

        *is_open = false;
        info!("database closed");
        Ok(())
    }

    /// Returns true if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    pub(crate) fn commit_write(
        &self,
        work: WorkingSet<R>,
        changes: Vec<Change<R>>,
    ) -> CoreResult<CommitInfo> {
        let is_open = self.is_open.read();
        if !*is_open {
            return Err(CoreError::DatabaseClosed);
        }
        self.txn_manager.commit(work, changes)
    }
}

impl<R: Record> fmt::Debug for Database<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("sequence", &self.last_sequence())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<R: Record> Drop for Database<R> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
