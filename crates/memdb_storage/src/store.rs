//! Entry store trait definition.

use crate::error::StorageResult;

/// Append-only storage of named entries.
///
/// # Invariants
///
/// - `create` never replaces an existing entry
/// - `read` returns exactly the bytes passed to `create`
/// - `list` only reports entries whose `create` completed
/// - After `sync` returns, every entry created before the call survives
///   process termination and power loss (as far as the OS honours fsync)
///
/// `list` makes no ordering promise. Callers that need an order encode it
/// in the names.
pub trait EntryStore: Send + Sync {
    /// Returns the names of all complete entries, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Reads the full contents of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::EntryNotFound`] if there is no such
    /// entry, or an I/O error.
    fn read(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Creates a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::EntryExists`] if an entry with this
    /// name is already present, or an I/O error.
    fn create(&mut self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces every entry created so far onto durable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the number of complete entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn len(&self) -> StorageResult<usize> {
        Ok(self.list()?.len())
    }

    /// Returns true if the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
