//! Records and key extraction.

use crate::types::IndexKey;
use std::fmt;
use std::sync::Arc;

/// A value stored in one of the tables.
///
/// The engine never inspects a record directly. Indexes read named fields
/// through [`Record::field`], and the WAL persists records through the
/// table's codec.
///
/// A database is generic over one record type. Databases with several
/// tables of different shapes use an enum with one variant per table.
///
/// # Example
///
/// ```
/// use memdb_core::{FieldValue, Record};
///
/// struct User {
///     id: u64,
///     email: String,
/// }
///
/// impl Record for User {
///     const FIELDS: &'static [&'static str] = &["ID", "Email"];
///
///     fn field(&self, name: &str) -> Option<FieldValue<'_>> {
///         match name {
///             "ID" => Some(FieldValue::Uint(self.id)),
///             "Email" => Some(FieldValue::Str(&self.email)),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Record: Send + Sync + 'static {
    /// Every field name [`Record::field`] may answer for.
    ///
    /// Checked when a schema is built, so an index on a misspelt field
    /// fails at construction instead of on the first insert.
    const FIELDS: &'static [&'static str];

    /// Returns the value of a named field, or `None` if this record has no
    /// such field.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// A borrowed field value that can be turned into an [`IndexKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// UTF-8 text.
    Str(&'a str),
    /// Raw bytes.
    Bytes(&'a [u8]),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Boolean.
    Bool(bool),
}

impl FieldValue<'_> {
    /// Converts the value into an order-preserving key.
    #[must_use]
    pub fn to_key(self) -> IndexKey {
        match self {
            Self::Str(s) => IndexKey::from(s),
            Self::Bytes(b) => IndexKey::from(b),
            Self::Int(n) => IndexKey::from(n),
            Self::Uint(n) => IndexKey::from(n),
            Self::Bool(b) => IndexKey::from(b),
        }
    }
}

impl From<FieldValue<'_>> for IndexKey {
    fn from(value: FieldValue<'_>) -> Self {
        value.to_key()
    }
}

type KeyFn<R> = dyn Fn(&R) -> Option<IndexKey> + Send + Sync;

/// Extracts an index key from a record.
pub struct Indexer<R> {
    kind: IndexerKind<R>,
}

enum IndexerKind<R> {
    Field(String),
    Func(Arc<KeyFn<R>>),
}

impl<R: Record> Indexer<R> {
    /// Indexes a named field of the record.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            kind: IndexerKind::Field(name.into()),
        }
    }

    /// Indexes the key computed by a function.
    ///
    /// Returning `None` for a record makes its insert fail with an
    /// index key error.
    #[must_use]
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&R) -> Option<IndexKey> + Send + Sync + 'static,
    {
        Self {
            kind: IndexerKind::Func(Arc::new(f)),
        }
    }

    /// Extracts the key, or `None` if the record lacks it.
    #[must_use]
    pub fn extract(&self, record: &R) -> Option<IndexKey> {
        match &self.kind {
            IndexerKind::Field(name) => record.field(name).map(FieldValue::to_key),
            IndexerKind::Func(f) => f(record),
        }
    }

    /// Returns the indexed field name for field indexers.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        match &self.kind {
            IndexerKind::Field(name) => Some(name),
            IndexerKind::Func(_) => None,
        }
    }

    /// Checks that a field indexer names a declared field.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match &self.kind {
            IndexerKind::Field(name) if !R::FIELDS.contains(&name.as_str()) => Err(format!(
                "record type {} has no field {name:?}",
                std::any::type_name::<R>()
            )),
            _ => Ok(()),
        }
    }
}

impl<R> Clone for Indexer<R> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            IndexerKind::Field(name) => IndexerKind::Field(name.clone()),
            IndexerKind::Func(f) => IndexerKind::Func(Arc::clone(f)),
        };
        Self { kind }
    }
}

impl<R> fmt::Debug for Indexer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IndexerKind::Field(name) => f.debug_tuple("Indexer::Field").field(name).finish(),
            IndexerKind::Func(_) => f.write_str("Indexer::Func"),
        }
    }
}
