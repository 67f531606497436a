//! Snapshot publication and commit serialization.

use super::{Change, CommitInfo, WorkingSet};
use crate::error::{CoreError, CoreResult};
use crate::schema::Record;
use crate::snapshot::Snapshot;
use crate::wal::{PersistedEntry, Wal};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Owns the current snapshot pointer and the WAL.
///
/// Readers load the pointer without locking. Commits serialize on
/// `commit_lock` so WAL order is commit order.
pub(crate) struct TransactionManager<R> {
    current: ArcSwap<Snapshot<R>>,
    commit_lock: Mutex<()>,
    wal: Wal,
}

impl<R: Record> TransactionManager<R> {
    pub(crate) fn new(initial: Snapshot<R>, wal: Wal) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            commit_lock: Mutex::new(()),
            wal,
        }
    }

    /// Returns the current snapshot.
    pub(crate) fn snapshot(&self) -> Arc<Snapshot<R>> {
        self.current.load_full()
    }

    pub(crate) fn wal(&self) -> &Wal {
        &self.wal
    }

    /// Logs `changes` and publishes the resulting snapshot.
    ///
    /// The new snapshot is fully assembled before the WAL append and only
    /// stored afterwards, so a failure anywhere leaves `current` untouched.
    pub(crate) fn commit(
        &self,
        work: WorkingSet<R>,
        changes: Vec<Change<R>>,
    ) -> CoreResult<CommitInfo> {
        if changes.is_empty() {
            return Ok(CommitInfo {
                changes: 0,
                sequence: self.current.load().sequence(),
                rebased: false,
            });
        }

        let schema = Arc::clone(work.base().schema());
        let entries = changes
            .iter()
            .map(|change| {
                let table = schema
                    .table(change.table())
                    .ok_or_else(|| CoreError::unknown_table(change.table()))?;
                PersistedEntry::from_change(change, table)
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let _guard = self.commit_lock.lock();

        let current = self.current.load_full();
        let rebased = !Arc::ptr_eq(&current, work.base());
        let work = if rebased {
            let mut replayed = WorkingSet::new(current);
            for change in &changes {
                replayed.apply(change)?;
            }
            replayed
        } else {
            work
        };

        let sequence = self.wal.append_batch(&entries)?;
        self.current.store(Arc::new(work.into_snapshot(sequence)));

        debug!(
            changes = changes.len(),
            sequence = sequence.as_u64(),
            rebased,
            "committed write transaction"
        );

        Ok(CommitInfo {
            changes: changes.len(),
            sequence,
            rebased,
        })
    }
}
