//! # memdb Codec
//!
//! Record codecs used by the memdb write-ahead log.
//!
//! The WAL never looks inside a record. For every table it holds a
//! [`RecordCodec`] that turns the table's records into bytes on commit and
//! back into records on replay.
//!
//! ## Available Codecs
//!
//! - [`CborCodec`] - Compact binary encoding via serde and ciborium
//! - [`JsonCodec`] - Human-readable encoding via serde_json
//! - [`MappedCodec`] - Adapts a codec for one type to a multi-table record enum
//!
//! ## Usage
//!
//! ```
//! use memdb_codec::{CborCodec, RecordCodec};
//!
//! let codec = CborCodec::<(String, u32)>::new();
//! let bytes = codec.encode(&("ada".to_string(), 36)).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), ("ada".to_string(), 36));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod serde_codec;

pub use codec::{MappedCodec, RecordCodec};
pub use error::{CodecError, CodecResult};
pub use serde_codec::{CborCodec, JsonCodec};
