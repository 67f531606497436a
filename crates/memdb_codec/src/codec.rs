//! The record codec trait and the mapping adapter.

use crate::error::{CodecError, CodecResult};
use std::sync::Arc;

/// Turns records of type `R` into portable bytes and back.
///
/// Implementations must round-trip: `decode(&encode(r)?)? == r`.
pub trait RecordCodec<R>: Send + Sync {
    /// Encodes a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    fn encode(&self, record: &R) -> CodecResult<Vec<u8>>;

    /// Decodes a record previously produced by [`RecordCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of `R`.
    fn decode(&self, bytes: &[u8]) -> CodecResult<R>;
}

impl<R, C: RecordCodec<R> + ?Sized> RecordCodec<R> for Arc<C> {
    fn encode(&self, record: &R) -> CodecResult<Vec<u8>> {
        (**self).encode(record)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<R> {
        (**self).decode(bytes)
    }
}

/// Adapts a codec for one concrete type `T` into a codec for a wider
/// record type `R`, typically an enum with one variant per table.
///
/// # Example
///
/// ```
/// use memdb_codec::{CborCodec, MappedCodec, RecordCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct User { name: String }
///
/// #[derive(Debug, PartialEq)]
/// enum Row { User(User), Other }
///
/// let codec = MappedCodec::new(CborCodec::<User>::new(), Row::User, |row| match row {
///     Row::User(user) => Some(user),
///     _ => None,
/// });
///
/// let row = Row::User(User { name: "ada".into() });
/// let bytes = codec.encode(&row).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), row);
/// assert!(codec.encode(&Row::Other).is_err());
/// ```
pub struct MappedCodec<R, T> {
    inner: Box<dyn RecordCodec<T>>,
    wrap: fn(T) -> R,
    unwrap: fn(&R) -> Option<&T>,
}

impl<R, T: 'static> MappedCodec<R, T> {
    /// Creates a mapped codec from an inner codec and the two conversions.
    pub fn new(
        inner: impl RecordCodec<T> + 'static,
        wrap: fn(T) -> R,
        unwrap: fn(&R) -> Option<&T>,
    ) -> Self {
        Self {
            inner: Box::new(inner),
            wrap,
            unwrap,
        }
    }
}

impl<R, T> RecordCodec<R> for MappedCodec<R, T> {
    fn encode(&self, record: &R) -> CodecResult<Vec<u8>> {
        let inner = (self.unwrap)(record).ok_or(CodecError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        self.inner.encode(inner)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<R> {
        self.inner.decode(bytes).map(self.wrap)
    }
}

impl<R, T> std::fmt::Debug for MappedCodec<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedCodec")
            .field("inner", &std::any::type_name::<T>())
            .field("outer", &std::any::type_name::<R>())
            .finish()
    }
}
