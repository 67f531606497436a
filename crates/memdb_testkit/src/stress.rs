//! Stress tests for memdb.
//!
//! These tests verify behavior under heavy load and concurrent access.

use crate::fixtures::{person, Person};
use memdb_core::{CoreError, Database};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct records.
    pub record_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            record_count: 1_000,
        }
    }
}

/// Run a sequential write stress test, one commit per insert.
pub fn stress_sequential_writes(db: &Database<Person>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let p = person((i % config.record_count) as u64);
        match db.transaction(|txn| txn.insert("test", p).map(|_| ())) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run concurrent writers on disjoint keys.
///
/// Every commit races the others and is rebased when it loses, so every
/// insert must survive.
pub fn stress_concurrent_writers(
    db: Arc<Database<Person>>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let p = person((t * ops_per_thread + i) as u64);
                    match db.transaction(|txn| txn.insert("test", p).map(|_| ())) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run readers against a writer that inserts `person(0..operations)` in
/// order, one commit each.
///
/// A reader counts as failed if its snapshot is not a prefix of the
/// writer's history, or if iterating it twice gives different results.
pub fn stress_readers_during_writes(
    db: Arc<Database<Person>>,
    config: &StressConfig,
) -> StressTestResult {
    let done = Arc::new(AtomicBool::new(false));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let db = Arc::clone(&db);
            let done = Arc::clone(&done);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let Ok(txn) = db.read() else {
                        failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };
                    let first: Vec<String> = match txn.iter("test", "id") {
                        Ok(iter) => iter.map(|(_, p)| p.id.clone()).collect(),
                        Err(_) => Vec::new(),
                    };
                    let prefix = (0..first.len()).map(|n| person(n as u64).id);
                    let consistent = first.iter().cloned().eq(prefix)
                        && txn.len("test").ok() == Some(first.len())
                        && txn.sequence().as_u64() == first.len() as u64;

                    if consistent {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    let mut write_failures = 0usize;
    for n in 0..config.operations {
        if db
            .transaction(|txn| txn.insert("test", person(n as u64)).map(|_| ()))
            .is_err()
        {
            write_failures += 1;
        }
    }
    done.store(true, Ordering::Release);

    for handle in readers {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed) + write_failures,
        start.elapsed(),
    )
}

/// Run a transaction abort stress test.
///
/// Every other transaction fails on purpose and must leave nothing behind.
pub fn stress_transaction_aborts(db: &Database<Person>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let should_fail = i % 2 == 0;
        let result = db.transaction(|txn| {
            txn.insert("test", person(i as u64))?;
            if should_fail {
                Err(CoreError::invalid_operation("intentional"))
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a large transaction stress test.
pub fn stress_large_transactions(db: &Database<Person>, config: &StressConfig) -> StressTestResult {
    let batch_size = 100;

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for batch in 0..(config.operations / batch_size) {
        let result = db.transaction(|txn| {
            for i in 0..batch_size {
                let n = (batch * batch_size + i) % config.record_count;
                txn.insert("test", person(n as u64))?;
            }
            Ok(())
        });

        match result {
            Ok(()) => successful += batch_size,
            Err(_) => failed += batch_size,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_schema;
    use memdb_core::SequenceNumber;

    fn create_test_db() -> Database<Person> {
        Database::open_in_memory(test_schema()).expect("Failed to create database")
    }

    #[test]
    fn test_sequential_writes() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            record_count: 100,
            ..Default::default()
        };

        let result = stress_sequential_writes(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
        assert_eq!(db.read().unwrap().len("test").unwrap(), 100);
        assert_eq!(db.last_sequence(), SequenceNumber::new(1_000));
    }

    #[test]
    fn test_concurrent_writers() {
        let db = Arc::new(create_test_db());
        let config = StressConfig {
            operations: 800,
            threads: 4,
            ..Default::default()
        };

        let result = stress_concurrent_writers(Arc::clone(&db), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 800);

        let txn = db.read().unwrap();
        assert_eq!(txn.len("test").unwrap(), 800);
        assert_eq!(txn.sequence(), SequenceNumber::new(800));
        crate::integration::assert_ordered(txn.snapshot());
    }

    #[test]
    fn test_readers_during_writes() {
        let db = Arc::new(create_test_db());
        let config = StressConfig {
            operations: 300,
            threads: 3,
            ..Default::default()
        };

        let result = stress_readers_during_writes(Arc::clone(&db), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(db.read().unwrap().len("test").unwrap(), 300);
    }

    #[test]
    fn test_transaction_aborts() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 200,
            ..Default::default()
        };

        let result = stress_transaction_aborts(&db, &config);
        assert_eq!(result.successful_ops, 100);
        assert_eq!(result.failed_ops, 100);

        let txn = db.read().unwrap();
        assert_eq!(txn.len("test").unwrap(), 100);
        assert!(txn.get("test", "id", "0000").unwrap().is_none());
        assert!(txn.get("test", "id", "0001").unwrap().is_some());
    }

    #[test]
    fn test_large_transactions() {
        let db = create_test_db();
        let config = StressConfig {
            operations: 1_000,
            record_count: 250,
            ..Default::default()
        };

        let result = stress_large_transactions(&db, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(db.read().unwrap().len("test").unwrap(), 250);
    }
}
