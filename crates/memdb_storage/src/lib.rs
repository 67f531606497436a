//! # memdb Storage
//!
//! Persisted-entry storage for the memdb write-ahead log.
//!
//! A store holds **named, immutable entries**. It does not interpret the
//! bytes it stores and it does not know how names are ordered; the WAL picks
//! fixed-width names so that a plain lexicographic sort of [`EntryStore::list`]
//! recovers commit order.
//!
//! ## Design Principles
//!
//! - Entries are created once and never overwritten or renamed
//! - An entry either exists completely or not at all
//! - Must be `Send + Sync` so a database handle can be shared across threads
//! - The WAL owns all format interpretation
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral databases
//! - [`DirStore`] - One file per entry inside a directory
//!
//! ## Example
//!
//! ```rust
//! use memdb_storage::{EntryStore, InMemoryStore};
//!
//! let mut store = InMemoryStore::new();
//! store.create("00000000000000000001.wal", b"hello").unwrap();
//! assert_eq!(store.read("00000000000000000001.wal").unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod memory;
mod store;

pub use dir::DirStore;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use store::EntryStore;
