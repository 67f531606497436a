//! Database directory management.
//!
//! This module handles the file system layout for memdb:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK     # Advisory lock held for the lifetime of the handle
//! └─ wal/     # One file per WAL entry: 00000000000000000001.wal, ...
//! ```
//!
//! The LOCK file ensures only one process can use the database at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_DIR: &str = "wal";

/// Manages the database directory structure and file locking.
///
/// The `DatabaseDir` holds an exclusive lock on the database directory.
/// Only one `DatabaseDir` instance can exist per directory at a time; the
/// lock is released when it is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another handle holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding WAL entries.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_DIR)
    }

    /// Checks if this is a new database directory (no WAL entries yet).
    pub fn is_new_database(&self) -> CoreResult<bool> {
        let wal = self.wal_path();
        if !wal.is_dir() {
            return Ok(true);
        }
        Ok(fs::read_dir(wal)?.next().is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.is_dir());
        assert!(db_path.join(LOCK_FILE).exists());
        assert_eq!(dir.wal_path(), db_path.join("wal"));
        assert!(dir.is_new_database().unwrap());
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = DatabaseDir::open(&temp.path().join("nonexistent"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn open_fails_on_plain_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"x").unwrap();

        let result = DatabaseDir::open(&file, true);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked_db");

        let _dir1 = DatabaseDir::open(&db_path, true).unwrap();
        let result = DatabaseDir::open(&db_path, true);
        assert!(matches!(result, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen_db");

        {
            let _dir = DatabaseDir::open(&db_path, true).unwrap();
        }

        let _dir2 = DatabaseDir::open(&db_path, true).unwrap();
    }

    #[test]
    fn existing_wal_entries_mark_database_as_used() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(temp.path(), true).unwrap();

        fs::create_dir(dir.wal_path()).unwrap();
        assert!(dir.is_new_database().unwrap());

        fs::write(dir.wal_path().join("00000000000000000001.wal"), b"x").unwrap();
        assert!(!dir.is_new_database().unwrap());
    }
}
