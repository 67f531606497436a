//! Test fixtures and database helpers.
//!
//! Provides sample record types, the schemas built on them, and
//! convenience functions for setting up test databases.

use memdb_codec::{CborCodec, JsonCodec, MappedCodec};
use memdb_core::{
    Config, CoreResult, DBSchema, Database, FieldValue, IndexKey, IndexSchema, Indexer, Record,
    TableSchema,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

/// A person, keyed by a zero-padded string id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Primary key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: u64,
}

impl Person {
    /// Creates a person.
    pub fn new(id: impl Into<String>, name: impl Into<String>, age: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age,
        }
    }
}

impl Record for Person {
    const FIELDS: &'static [&'static str] = &["ID", "Name", "Age"];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "ID" => Some(FieldValue::Str(&self.id)),
            "Name" => Some(FieldValue::Str(&self.name)),
            "Age" => Some(FieldValue::Uint(self.age)),
            _ => None,
        }
    }
}

/// A bank account, keyed by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Primary key.
    pub id: u64,
    /// Id of the owning [`Person`].
    pub owner: String,
    /// Balance in cents. May be negative.
    pub balance: i64,
}

impl Record for Account {
    const FIELDS: &'static [&'static str] = &["ID", "Owner", "Balance"];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "ID" => Some(FieldValue::Uint(self.id)),
            "Owner" => Some(FieldValue::Str(&self.owner)),
            "Balance" => Some(FieldValue::Int(self.balance)),
            _ => None,
        }
    }
}

/// One record of the two-table schema from [`row_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    /// A row of `people`.
    Person(Person),
    /// A row of `accounts`.
    Account(Account),
}

impl Row {
    /// Returns the person, if this is one.
    pub fn as_person(&self) -> Option<&Person> {
        match self {
            Self::Person(person) => Some(person),
            Self::Account(_) => None,
        }
    }

    /// Returns the account, if this is one.
    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Self::Account(account) => Some(account),
            Self::Person(_) => None,
        }
    }
}

impl Record for Row {
    const FIELDS: &'static [&'static str] = &["ID", "Name", "Age", "Owner", "Balance"];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match self {
            Self::Person(person) => person.field(name),
            Self::Account(account) => account.field(name),
        }
    }
}

/// Returns person number `n` with a four-digit id.
pub fn person(n: u64) -> Person {
    Person::new(format!("{n:04}"), format!("Person {n}"), 20 + n % 50)
}

/// Schema with the single table `test`.
///
/// Indexes:
/// - `id`: unique, on `ID` (primary)
/// - `age`: non-unique, on `Age`
/// - `name`: non-unique, on the lowercased name
pub fn test_schema() -> DBSchema<Person> {
    DBSchema::builder()
        .table(
            TableSchema::new("test", CborCodec::<Person>::new())
                .index(IndexSchema::unique("id", Indexer::field("ID")))
                .index(IndexSchema::non_unique("age", Indexer::field("Age")))
                .index(IndexSchema::non_unique(
                    "name",
                    Indexer::func(|p: &Person| Some(IndexKey::from(p.name.to_lowercase()))),
                )),
        )
        .build()
        .expect("test schema is valid")
}

/// Schema with the tables `people` and `accounts` over [`Row`].
///
/// People are stored as CBOR and accounts as JSON.
pub fn row_schema() -> DBSchema<Row> {
    let people = TableSchema::new(
        "people",
        MappedCodec::new(CborCodec::<Person>::new(), Row::Person, Row::as_person),
    )
    .index(IndexSchema::unique("id", Indexer::field("ID")))
    .index(IndexSchema::non_unique("age", Indexer::field("Age")));

    let accounts = TableSchema::new(
        "accounts",
        MappedCodec::new(JsonCodec::<Account>::new(), Row::Account, Row::as_account),
    )
    .index(IndexSchema::unique("id", Indexer::field("ID")))
    .index(IndexSchema::non_unique("owner", Indexer::field("Owner")))
    .index(IndexSchema::non_unique("balance", Indexer::field("Balance")));

    DBSchema::builder()
        .table(people)
        .table(accounts)
        .build()
        .expect("row schema is valid")
}

/// A directory-backed test database that can be closed and reopened.
///
/// The directory is deleted when the value is dropped.
pub struct TestDatabase {
    db: Option<Database<Person>>,
    config: Config,
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a new test database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new test database with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join("db"), test_schema(), config.clone())
            .expect("Failed to open test database");
        Self {
            db: Some(db),
            config,
            temp_dir,
        }
    }

    /// Returns the database directory.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("db")
    }

    /// Returns the directory holding the WAL entries.
    pub fn wal_path(&self) -> PathBuf {
        self.path().join("wal")
    }

    /// Closes the database, keeping its files.
    pub fn close(&mut self) -> CoreResult<()> {
        match self.db.take() {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }

    /// Closes the database and opens it again from its WAL.
    pub fn try_reopen(&mut self) -> CoreResult<&Database<Person>> {
        self.close()?;
        let db = Database::open_with_config(&self.path(), test_schema(), self.config.clone())?;
        Ok(self.db.insert(db))
    }

    /// Like [`TestDatabase::try_reopen`], panicking on error.
    pub fn reopen(&mut self) -> &Database<Person> {
        self.try_reopen().expect("Failed to reopen test database")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database<Person>;

    fn deref(&self) -> &Self::Target {
        self.db.as_ref().expect("test database is closed")
    }
}

/// Runs a test with a temporary in-memory database over [`test_schema`].
///
/// # Example
///
/// ```rust,ignore
/// use memdb_testkit::{person, with_temp_db};
///
/// with_temp_db(|db| {
///     db.transaction(|txn| txn.insert("test", person(1)).map(|_| ()))
///         .unwrap();
/// });
/// ```
pub fn with_temp_db<F, T>(f: F) -> T
where
    F: FnOnce(&Database<Person>) -> T,
{
    let db = Database::open_in_memory(test_schema()).expect("Failed to open in-memory database");
    f(&db)
}

/// Runs a test with a temporary directory-backed database.
pub fn with_file_db<F, T>(f: F) -> T
where
    F: FnOnce(&mut TestDatabase) -> T,
{
    let mut test_db = TestDatabase::new();
    f(&mut test_db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database holding `person(1..=count)`, one commit each.
    pub fn populated_database(count: u64) -> TestDatabase {
        let test_db = TestDatabase::new();
        for n in 1..=count {
            test_db
                .transaction(|txn| txn.insert("test", person(n)).map(|_| ()))
                .expect("Failed to insert person");
        }
        test_db
    }

    /// Creates an in-memory two-table database with `count` people, each
    /// owning one account.
    pub fn multi_table_database(count: u64) -> Database<Row> {
        let db = Database::open_in_memory(row_schema()).expect("Failed to open database");
        db.transaction(|txn| {
            for n in 1..=count {
                let owner = person(n);
                let account = Account {
                    id: 1000 + n,
                    owner: owner.id.clone(),
                    balance: n as i64 * 100 - 250,
                };
                txn.insert("people", Row::Person(owner))?;
                txn.insert("accounts", Row::Account(account))?;
            }
            Ok(())
        })
        .expect("Failed to populate database");
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdb_core::SequenceNumber;

    #[test]
    fn test_schema_has_primary_id() {
        let schema = test_schema();
        let table = schema.table("test").unwrap();
        assert_eq!(table.primary_index().name(), "id");
        assert_eq!(table.indexes().len(), 3);
    }

    #[test]
    fn with_temp_db_works() {
        with_temp_db(|db| {
            db.transaction(|txn| txn.insert("test", person(1)).map(|_| ()))
                .unwrap();
            assert_eq!(db.read().unwrap().len("test").unwrap(), 1);
        });
    }

    #[test]
    fn test_database_reopens() {
        let mut test_db = TestDatabase::new();
        test_db
            .transaction(|txn| txn.insert("test", person(7)).map(|_| ()))
            .unwrap();

        let db = test_db.reopen();
        assert_eq!(db.last_sequence(), SequenceNumber::new(1));
        let found = db.read().unwrap().get("test", "id", "0007").unwrap().unwrap();
        assert_eq!(*found, person(7));
    }

    #[test]
    fn populated_database_scenario() {
        let db = scenarios::populated_database(5);
        let txn = db.read().unwrap();
        assert_eq!(txn.len("test").unwrap(), 5);
        assert_eq!(db.last_sequence(), SequenceNumber::new(5));
    }

    #[test]
    fn multi_table_scenario() {
        let db = scenarios::multi_table_database(3);
        let txn = db.read().unwrap();
        assert_eq!(txn.len("people").unwrap(), 3);
        assert_eq!(txn.len("accounts").unwrap(), 3);

        let owned = txn.get_all("accounts", "owner", "0002").unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].as_account().unwrap().id, 1002);
    }

    #[test]
    fn negative_balances_sort_first() {
        let db = scenarios::multi_table_database(4);
        let balances: Vec<i64> = db
            .read()
            .unwrap()
            .iter("accounts", "balance")
            .unwrap()
            .map(|(_, row)| row.as_account().unwrap().balance)
            .collect();
        assert_eq!(balances, vec![-150, -50, 50, 150]);
    }

    #[test]
    fn wrong_row_kind_fails_to_index() {
        let db = Database::open_in_memory(row_schema()).unwrap();
        let mut txn = db.write().unwrap();
        // A person has no Owner field for the accounts indexes.
        let err = txn.insert("accounts", Row::Person(person(1))).unwrap_err();
        assert!(matches!(err, memdb_core::CoreError::IndexKey { .. }));
    }
}
