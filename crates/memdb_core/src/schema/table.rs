//! Table and index definitions.

use super::record::{Indexer, Record};
use crate::error::{CoreError, CoreResult};
use crate::types::IndexKey;
use memdb_codec::RecordCodec;
use std::fmt;
use std::sync::Arc;

/// Name of the index used as primary when none is designated.
pub const DEFAULT_PRIMARY_INDEX: &str = "id";

/// What a unique index does when a different record claims a held key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UniquePolicy {
    /// The newer record takes the key over.
    #[default]
    Upsert,
    /// The insert fails with [`CoreError::UniqueViolation`].
    Reject,
}

/// Definition of one index on a table.
pub struct IndexSchema<R> {
    name: String,
    unique: bool,
    policy: UniquePolicy,
    indexer: Indexer<R>,
}

impl<R: Record> IndexSchema<R> {
    /// Creates an index definition.
    #[must_use]
    pub fn new(name: impl Into<String>, unique: bool, indexer: Indexer<R>) -> Self {
        Self {
            name: name.into(),
            unique,
            policy: UniquePolicy::default(),
            indexer,
        }
    }

    /// Creates a unique index.
    #[must_use]
    pub fn unique(name: impl Into<String>, indexer: Indexer<R>) -> Self {
        Self::new(name, true, indexer)
    }

    /// Creates a non-unique index.
    #[must_use]
    pub fn non_unique(name: impl Into<String>, indexer: Indexer<R>) -> Self {
        Self::new(name, false, indexer)
    }

    /// Sets the collision policy. Only meaningful for unique indexes.
    #[must_use]
    pub fn with_policy(mut self, policy: UniquePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if one key maps to at most one record.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the collision policy.
    #[must_use]
    pub fn policy(&self) -> UniquePolicy {
        self.policy
    }

    /// Returns the key extractor.
    #[must_use]
    pub fn indexer(&self) -> &Indexer<R> {
        &self.indexer
    }

    pub(crate) fn rejects_collisions(&self) -> bool {
        self.unique && self.policy == UniquePolicy::Reject
    }
}

impl<R> fmt::Debug for IndexSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSchema")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .field("policy", &self.policy)
            .field("indexer", &self.indexer)
            .finish()
    }
}

/// Definition of one table: its record codec and its indexes.
pub struct TableSchema<R> {
    name: String,
    record_type: String,
    codec: Arc<dyn RecordCodec<R>>,
    indexes: Vec<IndexSchema<R>>,
    primary_name: Option<String>,
    primary: usize,
}

impl<R: Record> TableSchema<R> {
    /// Creates a table with no indexes yet.
    #[must_use]
    pub fn new(name: impl Into<String>, codec: impl RecordCodec<R> + 'static) -> Self {
        Self {
            name: name.into(),
            record_type: std::any::type_name::<R>().to_string(),
            codec: Arc::new(codec),
            indexes: Vec::new(),
            primary_name: None,
            primary: 0,
        }
    }

    /// Overrides the record type identifier.
    #[must_use]
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    /// Adds an index. Indexes keep their declaration order.
    #[must_use]
    pub fn index(mut self, index: IndexSchema<R>) -> Self {
        self.indexes.push(index);
        self
    }

    /// Designates the index whose key identifies a record.
    ///
    /// Defaults to the index named `"id"`.
    #[must_use]
    pub fn primary(mut self, index: impl Into<String>) -> Self {
        self.primary_name = Some(index.into());
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the record type identifier.
    #[must_use]
    pub fn record_type_name(&self) -> &str {
        &self.record_type
    }

    /// Returns the codec used to persist this table's records.
    #[must_use]
    pub fn codec(&self) -> &dyn RecordCodec<R> {
        self.codec.as_ref()
    }

    /// Returns the indexes in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[IndexSchema<R>] {
        &self.indexes
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexSchema<R>> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Returns the primary index.
    ///
    /// # Panics
    ///
    /// Panics on a table that declares no indexes, which a built
    /// [`super::DBSchema`] never contains.
    #[must_use]
    pub fn primary_index(&self) -> &IndexSchema<R> {
        &self.indexes[self.primary]
    }

    /// Extracts the primary key of a record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexKey`] if the record lacks the key.
    pub fn primary_key(&self, record: &R) -> CoreResult<IndexKey> {
        let index = self.primary_index();
        index
            .indexer()
            .extract(record)
            .ok_or_else(|| CoreError::index_key(&self.name, index.name(), "record has no key"))
    }

    pub(crate) fn index_position(&self, name: &str) -> CoreResult<usize> {
        self.indexes
            .iter()
            .position(|index| index.name == name)
            .ok_or_else(|| CoreError::unknown_index(&self.name, name))
    }

    pub(crate) fn primary_position(&self) -> usize {
        self.primary
    }

    /// Validates the table and resolves its primary index.
    pub(crate) fn validate(&mut self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::schema("table name is empty"));
        }
        if self.indexes.is_empty() {
            return Err(CoreError::schema(format!(
                "table {} declares no indexes",
                self.name
            )));
        }

        for (pos, index) in self.indexes.iter().enumerate() {
            if index.name.is_empty() {
                return Err(CoreError::schema(format!(
                    "table {} has an index with an empty name",
                    self.name
                )));
            }
            if self.indexes[..pos].iter().any(|other| other.name == index.name) {
                return Err(CoreError::schema(format!(
                    "table {} declares index {} twice",
                    self.name, index.name
                )));
            }
            index.indexer.validate().map_err(|message| {
                CoreError::schema(format!("index {}.{}: {message}", self.name, index.name))
            })?;
        }

        let primary_name = self
            .primary_name
            .as_deref()
            .unwrap_or(DEFAULT_PRIMARY_INDEX);
        let primary = self
            .indexes
            .iter()
            .position(|index| index.name == primary_name)
            .ok_or_else(|| {
                CoreError::schema(format!(
                    "table {} has no primary index {primary_name:?}",
                    self.name
                ))
            })?;
        if !self.indexes[primary].unique {
            return Err(CoreError::schema(format!(
                "primary index {}.{primary_name} must be unique",
                self.name
            )));
        }
        self.primary = primary;
        Ok(())
    }
}

impl<R> fmt::Debug for TableSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("name", &self.name)
            .field("record_type", &self.record_type)
            .field("indexes", &self.indexes)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}
