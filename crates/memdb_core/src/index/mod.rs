//! Index storage.
//!
//! Every (table, index) pair of a snapshot owns one [`IndexStore`], an
//! ordered copy-on-write map from index keys to records.

mod store;
mod tree;

pub use store::{IndexIter, IndexStore};
