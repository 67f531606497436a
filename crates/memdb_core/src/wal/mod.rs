//! Write-ahead log.
//!
//! One storage entry per committed change, named by a fixed-width sequence
//! number so a sort over names recovers commit order. See [`Wal`] for the
//! batching and durability rules and [`entry`] for the byte format.

pub mod entry;
mod log;

pub use entry::{EntryHeader, PersistedEntry};
pub use log::{Replay, Wal};
