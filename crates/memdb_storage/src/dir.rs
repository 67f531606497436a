//! Directory-backed entry store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::EntryStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffix of files that are still being written.
const TEMP_SUFFIX: &str = ".tmp";

/// Number of unsynced entries at which `flush` performs a full sync.
const FLUSH_SYNC_THRESHOLD: usize = 1024;

/// A directory-backed entry store.
///
/// Every entry is one file in the directory, named after the entry.
/// Data survives process restarts.
///
/// # Atomicity
///
/// `create` writes `<name>.tmp` and then renames it to `<name>`. A crash in
/// the middle of a write leaves at most a `.tmp` file, which is never listed
/// and is removed the next time the store is opened.
///
/// # Durability
///
/// - `flush()` does nothing until 1024 entries are waiting for a sync, then
///   syncs them; each entry file is already fully written and closed by `create`
/// - `sync()` syncs the directory so the renames are durable, then calls
///   `File::sync_all()` on every entry created since the last successful sync.
///   Entries that were not synced when an error occurs stay queued
///
/// # Example
///
/// ```no_run
/// use memdb_storage::{DirStore, EntryStore};
/// use std::path::Path;
///
/// let mut store = DirStore::open(Path::new("data/wal")).unwrap();
/// store.create("00000000000000000001.wal", b"entry").unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct DirStore {
    path: PathBuf,
    unsynced: Mutex<VecDeque<PathBuf>>,
}

impl DirStore {
    /// Opens a store in an existing directory.
    ///
    /// Leftover temporary files from interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, is not a directory, or
    /// cannot be read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.is_dir() {
            return Err(StorageError::InvalidLocation(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file() && name.to_string_lossy().ends_with(TEMP_SUFFIX) {
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            unsynced: Mutex::new(VecDeque::new()),
        })
    }

    /// Opens a store, creating the directory (and parents) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;
        Self::open(path)
    }

    /// Returns the directory holding the entries.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, name: &str) -> StorageResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.ends_with(TEMP_SUFFIX)
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.path.join(name))
    }
}

impl EntryStore for DirStore {
    fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.entry_path(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::EntryNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn create(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.entry_path(name)?;
        if target.exists() {
            return Err(StorageError::EntryExists {
                name: name.to_string(),
            });
        }

        let temp = self.path.join(format!("{name}{TEMP_SUFFIX}"));
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(data)?;
            file.flush()?;
        }
        fs::rename(&temp, &target)?;

        self.unsynced.lock().push_back(target);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.unsynced.lock().len() >= FLUSH_SYNC_THRESHOLD {
            return self.sync();
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut pending = self.unsynced.lock();
        if pending.is_empty() {
            return Ok(());
        }

        // Directory fsync makes the renames durable. Not supported on Windows.
        #[cfg(unix)]
        File::open(&self.path)?.sync_all()?;

        while let Some(path) = pending.front() {
            File::open(path)?.sync_all()?;
            pending.pop_front();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let result = DirStore::open(&dir.path().join("missing"));
        assert!(matches!(result, Err(StorageError::InvalidLocation(_))));
    }

    #[test]
    fn open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("wal");

        let store = DirStore::open_with_create_dirs(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(store.path(), path);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn create_and_read() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        store.create("0001.wal", b"hello").unwrap();
        store.create("0002.wal", b"world").unwrap();

        assert_eq!(store.read("0001.wal").unwrap(), b"hello");
        assert_eq!(store.read("0002.wal").unwrap(), b"world");

        let mut names = store.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["0001.wal", "0002.wal"]);
    }

    #[test]
    fn create_never_overwrites() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        store.create("0001.wal", b"first").unwrap();
        let result = store.create("0001.wal", b"second");

        assert!(matches!(result, Err(StorageError::EntryExists { .. })));
        assert_eq!(store.read("0001.wal").unwrap(), b"first");
    }

    #[test]
    fn read_missing_fails() {
        let dir = tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();

        let result = store.read("0001.wal");
        assert!(matches!(result, Err(StorageError::EntryNotFound { .. })));
    }

    #[test]
    fn invalid_names_rejected() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        for name in ["", ".hidden", "a/b", "x.tmp"] {
            assert!(
                matches!(store.create(name, b"x"), Err(StorageError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn temp_files_are_ignored_and_cleaned() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0003.wal.tmp"), b"partial").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let store = DirStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(!dir.path().join("0003.wal.tmp").exists());
    }

    #[test]
    fn entries_persist_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut store = DirStore::open(dir.path()).unwrap();
            store.create("0001.wal", b"persistent").unwrap();
            store.sync().unwrap();
        }

        let store = DirStore::open(dir.path()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.read("0001.wal").unwrap(), b"persistent");
    }

    #[test]
    fn flush_and_sync() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        // Syncing with nothing pending is fine
        store.sync().unwrap();

        store.create("0001.wal", b"data").unwrap();
        assert!(store.flush().is_ok());
        assert!(store.sync().is_ok());
        assert!(store.unsynced.lock().is_empty());
    }

    #[test]
    fn failed_sync_keeps_entries_queued() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        store.create("0001.wal", b"a").unwrap();
        store.create("0002.wal", b"b").unwrap();
        fs::remove_file(dir.path().join("0001.wal")).unwrap();

        assert!(matches!(store.sync(), Err(StorageError::Io(_))));
        assert_eq!(store.unsynced.lock().len(), 2);
        assert!(store.sync().is_err());

        fs::write(dir.path().join("0001.wal"), b"a").unwrap();
        store.sync().unwrap();
        assert!(store.unsynced.lock().is_empty());
    }

    #[test]
    fn flush_syncs_once_threshold_is_reached() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        for i in 0..FLUSH_SYNC_THRESHOLD - 1 {
            store.create(&format!("{i:04}.wal"), b"x").unwrap();
        }
        store.flush().unwrap();
        assert_eq!(store.unsynced.lock().len(), FLUSH_SYNC_THRESHOLD - 1);

        store.create("last.wal", b"x").unwrap();
        store.flush().unwrap();
        assert!(store.unsynced.lock().is_empty());
    }
}
