//! Schema model: tables, indexes and key extraction.
//!
//! A [`DBSchema`] is built once, validated, and then shared read-only by
//! every snapshot and transaction of a database.

mod record;
mod table;

pub use record::{FieldValue, Indexer, Record};
pub use table::{IndexSchema, TableSchema, UniquePolicy, DEFAULT_PRIMARY_INDEX};

use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::fmt;

/// The tables of a database.
pub struct DBSchema<R> {
    tables: Vec<TableSchema<R>>,
    by_name: HashMap<String, usize>,
}

impl<R: Record> DBSchema<R> {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> DBSchemaBuilder<R> {
        DBSchemaBuilder { tables: Vec::new() }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema<R>> {
        self.by_name.get(name).map(|&id| &self.tables[id])
    }

    /// Returns the tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[TableSchema<R>] {
        &self.tables
    }

    pub(crate) fn table_id(&self, name: &str) -> CoreResult<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::unknown_table(name))
    }

    pub(crate) fn table_at(&self, id: usize) -> &TableSchema<R> {
        &self.tables[id]
    }

    /// Resolves a (table, index) name pair to positions.
    pub(crate) fn locate(&self, table: &str, index: &str) -> CoreResult<(usize, usize)> {
        let table_id = self.table_id(table)?;
        let index_id = self.tables[table_id].index_position(index)?;
        Ok((table_id, index_id))
    }
}

impl<R> fmt::Debug for DBSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DBSchema")
            .field("tables", &self.tables)
            .finish()
    }
}

/// Builder for [`DBSchema`].
pub struct DBSchemaBuilder<R> {
    tables: Vec<TableSchema<R>>,
}

impl<R: Record> DBSchemaBuilder<R> {
    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableSchema<R>) -> Self {
        self.tables.push(table);
        self
    }

    /// Validates the definitions and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Schema`] if a name is empty or duplicated, a
    /// table has no indexes, the primary index is missing or not unique, or
    /// a field indexer names a field the record type does not declare.
    pub fn build(self) -> CoreResult<DBSchema<R>> {
        let mut tables = self.tables;
        let mut by_name = HashMap::with_capacity(tables.len());

        for (id, table) in tables.iter_mut().enumerate() {
            table.validate()?;
            if by_name.insert(table.name().to_string(), id).is_some() {
                return Err(CoreError::schema(format!(
                    "table {} is declared twice",
                    table.name()
                )));
            }
        }

        Ok(DBSchema { tables, by_name })
    }
}
