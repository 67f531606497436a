//! The write-ahead log.

use super::entry::{entry_name, parse_entry_name, EntryHeader, PersistedEntry};
use crate::error::{CoreError, CoreResult};
use crate::schema::{DBSchema, Record};
use crate::transaction::Change;
use crate::types::SequenceNumber;
use memdb_storage::EntryStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

struct WalState {
    store: Box<dyn EntryStore>,
    next_seq: SequenceNumber,
}

/// Append-only, totally ordered log of committed changes.
///
/// Every change is one entry in the underlying [`EntryStore`], named after
/// its sequence number. Changes committed together form a batch: all
/// entries carry the batch's first sequence number and the final one is
/// flagged, so replay can tell a finished commit from an interrupted one.
///
/// # Durability
///
/// Unless `sync_on_commit` is set, appends guarantee ordering and that each
/// entry exists completely or not at all, but not that it survives power
/// loss. With `sync_on_commit`, every batch ends with the store's `sync`
/// barrier.
pub struct Wal {
    state: Arc<Mutex<WalState>>,
    sync_on_commit: bool,
}

impl Wal {
    /// Opens the log held by `store`.
    ///
    /// New entries are numbered after the highest existing one. Names that
    /// are not WAL entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed, or if the highest
    /// existing entry leaves no sequence number for a new one.
    pub fn open(store: Box<dyn EntryStore>, sync_on_commit: bool) -> CoreResult<Self> {
        let mut last = SequenceNumber::ZERO;
        let mut foreign = 0usize;
        for name in store.list()? {
            match parse_entry_name(&name) {
                Some(seq) => last = last.max(seq),
                None => foreign += 1,
            }
        }
        if foreign > 0 {
            warn!(count = foreign, "ignoring entries that are not WAL entries");
        }

        let next_seq = last
            .checked_next()
            .ok_or_else(|| CoreError::wal_corruption("sequence space exhausted"))?;

        Ok(Self {
            state: Arc::new(Mutex::new(WalState { store, next_seq })),
            sync_on_commit,
        })
    }

    /// Returns the sequence number the next entry will get.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.state.lock().next_seq
    }

    /// Appends one entry as a batch of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub fn append(&self, entry: &PersistedEntry) -> CoreResult<SequenceNumber> {
        self.append_batch(std::slice::from_ref(entry))
    }

    /// Appends entries as one batch and returns the last sequence number.
    ///
    /// Sequence numbers are assigned under the same lock that writes the
    /// entries, so concurrent appends never interleave. An empty batch
    /// writes nothing and returns the last assigned number.
    ///
    /// If writing fails part way, the entries already written stay in the
    /// store without a final entry and replay discards them. Their sequence
    /// numbers are never reused.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be encoded or written, the flush
    /// or sync fails, or the batch does not fit in the sequence space.
    pub fn append_batch(&self, entries: &[PersistedEntry]) -> CoreResult<SequenceNumber> {
        let mut state = self.state.lock();
        let first = state.next_seq;
        if entries.is_empty() {
            return Ok(SequenceNumber::new(first.as_u64() - 1));
        }
        // The number after the batch must exist too.
        if first.as_u64().checked_add(entries.len() as u64).is_none() {
            return Err(CoreError::wal_corruption("sequence space exhausted"));
        }

        let encoded = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let header = EntryHeader {
                    sequence: SequenceNumber::new(first.as_u64() + i as u64),
                    batch: first,
                    last_in_batch: i + 1 == entries.len(),
                };
                entry.encode(header).map(|data| (header.sequence, data))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let mut last = first;
        for (seq, data) in &encoded {
            if let Err(err) = state.store.create(&entry_name(*seq), data) {
                state.next_seq = seq.next();
                return Err(err.into());
            }
            last = *seq;
        }
        state.next_seq = last.next();

        if self.sync_on_commit {
            state.store.sync()?;
        } else {
            state.store.flush()?;
        }
        Ok(last)
    }

    /// Flushes buffered entries to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the store flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.state.lock().store.flush()?;
        Ok(())
    }

    /// Forces every entry onto durable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the store sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.state.lock().store.sync()?;
        Ok(())
    }

    /// Returns a lazy iterator over every committed change in log order.
    ///
    /// Entries are read one at a time. Changes of a batch are released only
    /// once the batch's final entry has been read; incomplete batches are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed. Errors reading or
    /// decoding individual entries are yielded by the iterator, which then
    /// stops.
    pub fn replay<R: Record>(&self, schema: &Arc<DBSchema<R>>) -> CoreResult<Replay<R>> {
        let mut names: Vec<(SequenceNumber, String)> = self
            .state
            .lock()
            .store
            .list()?
            .into_iter()
            .filter_map(|name| parse_entry_name(&name).map(|seq| (seq, name)))
            .collect();
        names.sort_unstable_by_key(|(seq, _)| *seq);

        Ok(Replay {
            state: Arc::clone(&self.state),
            schema: Arc::clone(schema),
            names: names.into_iter(),
            pending: Vec::new(),
            pending_batch: SequenceNumber::ZERO,
            ready: VecDeque::new(),
            applied: SequenceNumber::ZERO,
            discarded: 0,
            done: false,
        })
    }
}

impl fmt::Debug for Wal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wal")
            .field("next_seq", &self.next_sequence())
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

/// Iterator over the changes recorded in a [`Wal`].
///
/// Produced by [`Wal::replay`]. It is finite and cannot be restarted; call
/// `replay` again for a fresh pass.
pub struct Replay<R> {
    state: Arc<Mutex<WalState>>,
    schema: Arc<DBSchema<R>>,
    names: std::vec::IntoIter<(SequenceNumber, String)>,
    pending: Vec<Change<R>>,
    pending_batch: SequenceNumber,
    ready: VecDeque<Change<R>>,
    applied: SequenceNumber,
    discarded: usize,
    done: bool,
}

impl<R: Record> Replay<R> {
    /// Returns the sequence number of the last entry released so far.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.applied
    }

    /// Returns how many incomplete batches were skipped so far.
    #[must_use]
    pub fn discarded_batches(&self) -> usize {
        self.discarded
    }

    fn read(&self, seq: SequenceNumber, name: &str) -> CoreResult<(EntryHeader, Change<R>)> {
        let data = self.state.lock().store.read(name)?;
        let (header, entry) = PersistedEntry::decode(&data)?;
        if header.sequence != seq {
            return Err(CoreError::wal_corruption(format!(
                "entry {name} records {}",
                header.sequence
            )));
        }
        Ok((header, entry.into_change(&self.schema)?))
    }

    fn accept(&mut self, header: EntryHeader, change: Change<R>) {
        if !self.pending.is_empty() && header.batch != self.pending_batch {
            self.discard_pending();
        }
        self.pending_batch = header.batch;
        self.pending.push(change);

        if header.last_in_batch {
            self.ready.extend(self.pending.drain(..));
            self.applied = header.sequence;
        }
    }

    fn discard_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            batch = self.pending_batch.as_u64(),
            entries = self.pending.len(),
            "discarding incomplete WAL batch"
        );
        self.pending.clear();
        self.discarded += 1;
    }
}

impl<R: Record> Iterator for Replay<R> {
    type Item = CoreResult<Change<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(change) = self.ready.pop_front() {
                return Some(Ok(change));
            }
            if self.done {
                return None;
            }

            let Some((seq, name)) = self.names.next() else {
                self.done = true;
                self.discard_pending();
                return None;
            };

            match self.read(seq, &name) {
                Ok((header, change)) => self.accept(header, change),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{item_schema, FaultyStore, Item};
    use crate::types::IndexKey;
    use memdb_storage::InMemoryStore;
    use std::collections::BTreeMap;

    fn put(id: &str) -> PersistedEntry {
        let schema = item_schema();
        let change = Change::insert(
            "items",
            IndexKey::from(id),
            Arc::new(Item::new(id, "red", 1)),
        );
        PersistedEntry::from_change(&change, schema.table("items").unwrap()).unwrap()
    }

    fn del(id: &str) -> PersistedEntry {
        PersistedEntry {
            table: "items".into(),
            primary_key: id.as_bytes().to_vec(),
            payload: None,
        }
    }

    fn replay_keys(wal: &Wal) -> Vec<(String, bool)> {
        let schema = Arc::new(item_schema());
        wal.replay(&schema)
            .unwrap()
            .map(|change| {
                let change = change.unwrap();
                (
                    String::from_utf8_lossy(change.primary_key().as_bytes()).into_owned(),
                    change.is_tombstone(),
                )
            })
            .collect()
    }

    #[test]
    fn sequence_starts_at_one() {
        let wal = Wal::open(Box::new(InMemoryStore::new()), false).unwrap();
        assert_eq!(wal.next_sequence(), SequenceNumber::new(1));
        assert_eq!(wal.append(&put("a")).unwrap(), SequenceNumber::new(1));
        assert_eq!(wal.append(&put("b")).unwrap(), SequenceNumber::new(2));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let store = FaultyStore::new();
        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        assert_eq!(wal.append_batch(&[]).unwrap(), SequenceNumber::ZERO);
        assert!(store.names().is_empty());
    }

    #[test]
    fn replay_in_append_order() {
        let wal = Wal::open(Box::new(InMemoryStore::new()), false).unwrap();
        wal.append_batch(&[put("b"), put("a")]).unwrap();
        wal.append(&del("b")).unwrap();

        assert_eq!(
            replay_keys(&wal),
            vec![
                ("b".to_string(), false),
                ("a".to_string(), false),
                ("b".to_string(), true)
            ]
        );
    }

    #[test]
    fn sequence_continues_after_reopen() {
        let store = FaultyStore::new();
        {
            let wal = Wal::open(Box::new(store.clone()), false).unwrap();
            wal.append_batch(&[put("a"), put("b"), put("c")]).unwrap();
        }

        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        assert_eq!(wal.next_sequence(), SequenceNumber::new(4));
        wal.append(&put("d")).unwrap();
        assert!(store.names().contains(&"00000000000000000004.wal".to_string()));
    }

    #[test]
    fn sequence_uses_max_not_count() {
        let store = FaultyStore::new();
        let data = put("x")
            .encode(EntryHeader {
                sequence: SequenceNumber::new(7),
                batch: SequenceNumber::new(7),
                last_in_batch: true,
            })
            .unwrap();
        store.put_raw("00000000000000000007.wal", data);

        let wal = Wal::open(Box::new(store), false).unwrap();
        assert_eq!(wal.next_sequence(), SequenceNumber::new(8));
    }

    #[test]
    fn exhausted_sequence_space_fails_open() {
        let entries = BTreeMap::from([(
            "18446744073709551615.wal".to_string(),
            b"junk".to_vec(),
        )]);
        let result = Wal::open(Box::new(InMemoryStore::with_entries(entries)), false);
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
    }

    #[test]
    fn batch_past_sequence_space_fails() {
        let store = FaultyStore::new();
        store.put_raw("18446744073709551613.wal", b"junk".to_vec());
        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        assert_eq!(wal.next_sequence(), SequenceNumber::new(u64::MAX - 1));

        let result = wal.append_batch(&[put("a"), put("b")]);
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
        assert_eq!(store.names().len(), 1);

        assert_eq!(wal.append(&put("a")).unwrap(), SequenceNumber::new(u64::MAX - 1));
    }

    #[test]
    fn foreign_entries_are_skipped() {
        let store = FaultyStore::new();
        store.put_raw("README", b"not an entry".to_vec());

        let wal = Wal::open(Box::new(store), false).unwrap();
        wal.append(&put("a")).unwrap();
        assert_eq!(replay_keys(&wal).len(), 1);
    }

    #[test]
    fn failed_batch_is_discarded_on_replay() {
        let store = FaultyStore::new();
        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        wal.append(&put("a")).unwrap();

        store.fail_after(1);
        let err = wal.append_batch(&[put("b"), put("c")]).unwrap_err();
        assert!(err.is_storage());
        store.heal();

        // The half-written batch stays on disk but is never replayed,
        // and its sequence numbers are not reused.
        assert_eq!(store.names().len(), 2);
        assert_eq!(wal.append(&put("d")).unwrap(), SequenceNumber::new(4));

        let schema = Arc::new(item_schema());
        let mut replay = wal.replay(&schema).unwrap();
        let keys: Vec<_> = replay
            .by_ref()
            .map(|c| c.unwrap().primary_key().clone())
            .collect();
        assert_eq!(keys, vec![IndexKey::from("a"), IndexKey::from("d")]);
        assert_eq!(replay.discarded_batches(), 1);
        assert_eq!(replay.last_sequence(), SequenceNumber::new(4));
    }

    #[test]
    fn trailing_incomplete_batch_is_discarded() {
        let store = FaultyStore::new();
        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        wal.append(&put("a")).unwrap();
        store.fail_after(2);
        assert!(wal.append_batch(&[put("b"), put("c"), put("d")]).is_err());

        let schema = Arc::new(item_schema());
        let mut replay = wal.replay(&schema).unwrap();
        assert_eq!(replay.by_ref().count(), 1);
        assert_eq!(replay.discarded_batches(), 1);
        assert_eq!(replay.last_sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn corruption_stops_replay() {
        let store = FaultyStore::new();
        let wal = Wal::open(Box::new(store.clone()), false).unwrap();
        wal.append(&put("a")).unwrap();
        wal.append(&put("b")).unwrap();

        let name = "00000000000000000002.wal";
        let mut data = store.get_raw(name).unwrap();
        data[10] ^= 0xff;
        store.put_raw(name, data);

        let schema = Arc::new(item_schema());
        let results: Vec<_> = wal.replay(&schema).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn misnamed_entry_is_corrupt() {
        let store = FaultyStore::new();
        let data = put("a")
            .encode(EntryHeader {
                sequence: SequenceNumber::new(3),
                batch: SequenceNumber::new(3),
                last_in_batch: true,
            })
            .unwrap();
        store.put_raw("00000000000000000001.wal", data);

        let wal = Wal::open(Box::new(store), false).unwrap();
        let schema = Arc::new(item_schema());
        let first = wal.replay(&schema).unwrap().next().unwrap();
        assert!(matches!(first, Err(CoreError::WalCorruption { .. })));
    }

    #[test]
    fn sync_on_commit_syncs_each_batch() {
        let store = FaultyStore::new();
        let wal = Wal::open(Box::new(store.clone()), true).unwrap();
        wal.append(&put("a")).unwrap();
        wal.append_batch(&[put("b"), put("c")]).unwrap();
        assert_eq!(store.sync_count(), 2);
    }
}
