//! Benchmark utilities.

use memdb_core::Database;
use memdb_testkit::{person, test_schema, Person};
use rand::seq::SliceRandom;
use rand::Rng;

/// Generate `count` people with ids `0..count` in random order.
pub fn shuffled_people(count: u64) -> Vec<Person> {
    let mut rng = rand::thread_rng();
    let mut people: Vec<Person> = (0..count)
        .map(|n| {
            let mut p = person(n);
            p.age = rng.gen_range(0..100);
            p
        })
        .collect();
    people.shuffle(&mut rng);
    people
}

/// Returns a random existing id of a database filled by [`populated_db`].
pub fn random_id(count: u64) -> String {
    person(rand::thread_rng().gen_range(0..count)).id
}

/// Opens an in-memory database holding `count` people, inserted in
/// batches of `batch` per commit.
pub fn populated_db(count: u64, batch: usize) -> Database<Person> {
    let db = Database::open_in_memory(test_schema()).expect("Failed to open database");
    for chunk in shuffled_people(count).chunks(batch.max(1)) {
        db.transaction(|txn| {
            for p in chunk {
                txn.insert("test", p.clone())?;
            }
            Ok(())
        })
        .expect("Failed to populate database");
    }
    db
}
