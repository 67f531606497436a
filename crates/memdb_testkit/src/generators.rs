//! Property-based test generators using proptest.
//!
//! Operations draw their keys from a small key space so that generated
//! histories overwrite and delete records they wrote earlier.

use crate::fixtures::Person;
use memdb_core::{CommitInfo, CoreResult, Database};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Number of distinct primary keys the strategies draw from.
pub const KEY_SPACE: u64 = 16;

/// Strategy for generating primary keys within [`KEY_SPACE`].
pub fn key_strategy() -> impl Strategy<Value = String> {
    (0..KEY_SPACE).prop_map(|n| format!("{n:04}"))
}

/// Strategy for generating people with keys within [`KEY_SPACE`].
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (
        key_strategy(),
        prop::string::string_regex("[A-Za-z]{1,12}").expect("Invalid regex"),
        0u64..100,
    )
        .prop_map(|(id, name, age)| Person::new(id, name, age))
}

/// One write inside a commit.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert or replace a person.
    Insert(Person),
    /// Delete by primary key.
    Delete(String),
}

/// Strategy for generating operations, biased towards inserts.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => person_strategy().prop_map(Operation::Insert),
        1 => key_strategy().prop_map(Operation::Delete),
    ]
}

/// Strategy for generating a history of commits.
///
/// Empty commits are included on purpose; they must not touch the WAL.
pub fn commit_history_strategy(
    max_commits: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Vec<Operation>>> {
    prop::collection::vec(
        prop::collection::vec(operation_strategy(), 0..max_ops),
        1..max_commits,
    )
}

/// Applies one commit's operations to table `test`.
pub fn apply_commit(db: &Database<Person>, ops: &[Operation]) -> CoreResult<CommitInfo> {
    let mut txn = db.write()?;
    for op in ops {
        match op {
            Operation::Insert(person) => {
                txn.insert("test", person.clone())?;
            }
            Operation::Delete(id) => txn.delete_key("test", id.as_str())?,
        }
    }
    txn.commit()
}

/// Returns the contents of table `test` after `history`, keyed by id.
pub fn expected_contents(history: &[Vec<Operation>]) -> BTreeMap<String, Person> {
    let mut model = BTreeMap::new();
    for op in history.iter().flatten() {
        match op {
            Operation::Insert(person) => {
                model.insert(person.id.clone(), person.clone());
            }
            Operation::Delete(id) => {
                model.remove(id);
            }
        }
    }
    model
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
