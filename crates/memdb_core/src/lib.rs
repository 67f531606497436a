//! # memdb Core
//!
//! Embedded in-memory database engine with snapshot-isolated transactions.
//!
//! This crate provides:
//! - A schema of tables, each with ordered unique and non-unique indexes
//! - Copy-on-write index stores with structural sharing between versions
//! - Read transactions over immutable snapshots
//! - Write transactions that commit atomically and are serialized at commit
//! - A write-ahead log for durability and replay on open
//!
//! ## Example
//!
//! ```rust,ignore
//! use memdb_core::{Database, DBSchema, IndexSchema, Indexer, TableSchema};
//! use memdb_codec::CborCodec;
//!
//! let schema = DBSchema::builder()
//!     .table(
//!         TableSchema::new("items", CborCodec::<Item>::new())
//!             .index(IndexSchema::unique("id", Indexer::field("ID")))
//!             .index(IndexSchema::non_unique("color", Indexer::field("Color"))),
//!     )
//!     .build()?;
//!
//! let db = Database::open_in_memory(schema)?;
//! db.transaction(|txn| txn.insert("items", item).map(|_| ()))?;
//!
//! let txn = db.read()?;
//! for (key, item) in txn.iter("items", "color")? {
//!     println!("{key:?}: {item:?}");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod dir;
mod error;
mod index;
mod schema;
mod snapshot;
mod transaction;
mod types;
pub mod wal;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use index::{IndexIter, IndexStore};
pub use schema::{
    DBSchema, DBSchemaBuilder, FieldValue, IndexSchema, Indexer, Record, TableSchema,
    UniquePolicy, DEFAULT_PRIMARY_INDEX,
};
pub use snapshot::Snapshot;
pub use transaction::{Change, CommitInfo, ReadTxn, Txn, WriteTxn};
pub use types::{IndexKey, SequenceNumber};

pub use memdb_codec::{CborCodec, JsonCodec, MappedCodec, RecordCodec};
pub use memdb_storage::{DirStore, EntryStore, InMemoryStore, StorageError};
