//! In-memory storage backend.
//!
//! Thread-safe reference implementation of [`RecordStore`]. Transactions are
//! copy-on-write: the closure works on a private copy of the state, which
//! replaces the shared state only when the closure succeeds. The store can be
//! written to and reopened from a JSON snapshot.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::query::Lookup;
use crate::record::{Record, RecordId};
use crate::storage::traits::{RecordStore, RecordTxn, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Clone, Default)]
struct RecordState {
    by_id: HashMap<RecordId, Record>,
    by_table: HashMap<String, BTreeMap<u64, RecordId>>,
    retired: HashMap<RecordId, RecordId>,
    next_sequence: u64,
}

impl RecordState {
    fn index_insert(&mut self, record: &Record) {
        self.by_table
            .entry(record.table.clone())
            .or_default()
            .insert(record.sequence, record.id);
    }

    fn index_remove(&mut self, record: &Record) {
        if let Some(ids) = self.by_table.get_mut(&record.table) {
            ids.remove(&record.sequence);
            if ids.is_empty() {
                self.by_table.remove(&record.table);
            }
        }
    }

    fn find_holder(&self, target: RecordId) -> Option<(&Record, &str)> {
        self.by_id.values().filter(|r| r.id != target).find_map(|record| {
            record
                .references()
                .find(|(_, id)| *id == target)
                .map(|(field, _)| (record, field))
        })
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut records: Vec<Record> = self.by_id.values().cloned().collect();
        records.sort_by_key(|r| r.sequence);
        let mut retired: Vec<(RecordId, RecordId)> =
            self.retired.iter().map(|(k, v)| (*k, *v)).collect();
        retired.sort();
        Snapshot {
            next_sequence: self.next_sequence,
            records,
            retired,
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Result<Self, StorageError> {
        let mut state = Self {
            next_sequence: snapshot.next_sequence,
            retired: snapshot.retired.into_iter().collect(),
            ..Self::default()
        };
        for record in snapshot.records {
            if record.sequence >= state.next_sequence {
                return Err(StorageError::Snapshot(format!(
                    "record {} has sequence {} beyond next_sequence {}",
                    record.id, record.sequence, state.next_sequence
                )));
            }
            if state.by_id.contains_key(&record.id) || state.retired.contains_key(&record.id) {
                return Err(StorageError::Snapshot(format!(
                    "record {} appears twice",
                    record.id
                )));
            }
            state.index_insert(&record);
            state.by_id.insert(record.id, record);
        }
        Ok(state)
    }
}

impl RecordTxn for RecordState {
    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        Ok(self.by_id.get(&id).cloned())
    }

    fn select(&self, table: &str, lookup: &Lookup) -> Result<Vec<Record>, StorageError> {
        let Some(ids) = self.by_table.get(table) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .values()
            .filter_map(|id| self.by_id.get(id))
            .filter(|record| lookup.matches(record))
            .cloned()
            .collect())
    }

    fn insert(&mut self, mut record: Record) -> Result<Record, StorageError> {
        if self.by_id.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey(record.id));
        }
        if self.retired.contains_key(&record.id) {
            return Err(StorageError::Retired(record.id));
        }

        let now = Utc::now();
        record.version = 1;
        record.sequence = self.next_sequence;
        record.created_at = now;
        record.updated_at = now;
        self.next_sequence += 1;

        self.index_insert(&record);
        self.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(&mut self, mut record: Record) -> Result<Record, StorageError> {
        if self.retired.contains_key(&record.id) {
            return Err(StorageError::Retired(record.id));
        }
        let prev = self
            .by_id
            .get(&record.id)
            .ok_or(StorageError::RecordNotFound(record.id))?;

        if prev.table != record.table {
            return Err(StorageError::Backend(format!(
                "record {} cannot move from table {} to {}",
                record.id, prev.table, record.table
            )));
        }

        record.version = prev
            .version
            .checked_add(1)
            .ok_or_else(|| StorageError::Backend("record version overflow".to_string()))?;
        record.sequence = prev.sequence;
        record.created_at = prev.created_at;
        record.updated_at = Utc::now();

        self.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    fn retire(&mut self, id: RecordId, successor: RecordId) -> Result<(), StorageError> {
        if id == successor {
            return Err(StorageError::Backend(
                "cannot retire a record into itself".to_string(),
            ));
        }
        if !self.by_id.contains_key(&successor) {
            return Err(StorageError::RecordNotFound(successor));
        }
        if !self.by_id.contains_key(&id) {
            return Err(StorageError::RecordNotFound(id));
        }

        if let Some((holder, field)) = self.find_holder(id) {
            return Err(StorageError::DanglingReference {
                id,
                table: holder.table.clone(),
                field: field.to_string(),
                holder: holder.id,
            });
        }

        if let Some(prev) = self.by_id.remove(&id) {
            self.index_remove(&prev);
        }
        self.retired.insert(id, successor);
        Ok(())
    }

    fn successor(&self, id: RecordId) -> Result<Option<RecordId>, StorageError> {
        Ok(self.retired.get(&id).copied())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_sequence: u64,
    records: Vec<Record>,
    #[serde(default)]
    retired: Vec<(RecordId, RecordId)>,
}

/// Thread-safe in-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<RecordState>,
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records across all tables.
    ///
    /// # Errors
    /// - `Backend`: the lock is poisoned
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.len"))?;
        Ok(state.by_id.len())
    }

    /// Returns true if no live records exist.
    ///
    /// # Errors
    /// - `Backend`: the lock is poisoned
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Number of live records in `table`.
    ///
    /// # Errors
    /// - `Backend`: the lock is poisoned
    pub fn table_len(&self, table: &str) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("store.table_len"))?;
        Ok(state.by_table.get(table).map_or(0, BTreeMap::len))
    }

    /// Open a store from a JSON snapshot written by [`Self::write_snapshot`].
    ///
    /// # Errors
    /// - `Snapshot`: the file cannot be read or is not a valid snapshot
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| StorageError::Snapshot(format!("read {}: {e}", path.display())))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Snapshot(format!("parse {}: {e}", path.display())))?;
        Ok(Self {
            state: RwLock::new(RecordState::from_snapshot(snapshot)?),
        })
    }

    /// Write the current state as a JSON snapshot.
    ///
    /// # Errors
    /// - `Snapshot`: serialization or the file write failed
    pub fn write_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let snapshot = {
            let state = self.state.read().map_err(|_| lock_err("store.write_snapshot"))?;
            state.to_snapshot()
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StorageError::Snapshot(e.to_string()))?;
        std::fs::write(path, bytes)
            .map_err(|e| StorageError::Snapshot(format!("write {}: {e}", path.display())))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn RecordTxn) -> Result<T, E>,
    {
        let state = self.state.read().map_err(|_| lock_err("store.read"))?;
        work(&*state)
    }

    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn RecordTxn) -> Result<T, E>,
    {
        let mut state = self.state.write().map_err(|_| lock_err("store.transaction"))?;
        let mut working = state.clone();
        let out = work(&mut working)?;
        *state = working;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::resolve_successor;

    fn city(name: &str) -> Record {
        Record::new("city", RecordId::new()).with("name", name)
    }

    #[test]
    fn insert_get_update_and_versioning() {
        let store = InMemoryRecordStore::new();
        let rec = city("Alameda");
        let id = rec.id;

        let stored = store
            .transaction(|txn| txn.insert(rec.clone()))
            .unwrap();
        assert_eq!(stored.version, 1);

        let dup: Result<Record, StorageError> = store.transaction(|txn| txn.insert(rec.clone()));
        assert!(matches!(dup, Err(StorageError::DuplicateKey(_))));

        let updated = store
            .transaction(|txn| txn.update(stored.clone().with("short_name", "ALA")))
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.sequence, stored.sequence);
        assert_eq!(updated.created_at, stored.created_at);

        let got: Option<Record> = store.read(|txn| txn.get(id)).unwrap();
        assert_eq!(got.unwrap().text("short_name"), Some("ALA"));
    }

    #[test]
    fn select_filters_by_table_and_keeps_insertion_order() {
        let store = InMemoryRecordStore::new();
        store
            .transaction(|txn| {
                txn.insert(city("Berkeley"))?;
                txn.insert(city("Alameda"))?;
                txn.insert(Record::new("county", RecordId::new()).with("name", "Alameda"))?;
                Ok::<_, StorageError>(())
            })
            .unwrap();

        let all: Vec<Record> = store
            .read(|txn| txn.select("city", &Lookup::new()))
            .unwrap();
        let names: Vec<_> = all.iter().filter_map(|r| r.text("name")).collect();
        assert_eq!(names, vec!["Berkeley", "Alameda"]);

        let alameda: Vec<Record> = store
            .read(|txn| txn.select("county", &Lookup::new().eq("name", "Alameda")))
            .unwrap();
        assert_eq!(alameda.len(), 1);
        assert_eq!(store.table_len("city").unwrap(), 2);
        assert_eq!(store.table_len("state").unwrap(), 0);
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryRecordStore::new();
        let result: Result<(), StorageError> = store.transaction(|txn| {
            txn.insert(city("Alameda"))?;
            Err(StorageError::Backend("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn retire_refuses_dangling_references() {
        let store = InMemoryRecordStore::new();
        let old = city("ALAMEDA");
        let survivor = city("Alameda");
        let zip = Record::new("zip_code", RecordId::new())
            .with("short_name", "94501")
            .with("city", old.id);
        let (old_id, survivor_id, zip_id) = (old.id, survivor.id, zip.id);

        store
            .transaction(|txn| {
                txn.insert(old)?;
                txn.insert(survivor)?;
                txn.insert(zip)?;
                Ok::<_, StorageError>(())
            })
            .unwrap();

        let refused: Result<(), StorageError> =
            store.transaction(|txn| txn.retire(old_id, survivor_id));
        match refused {
            Err(StorageError::DanglingReference { table, field, holder, .. }) => {
                assert_eq!(table, "zip_code");
                assert_eq!(field, "city");
                assert_eq!(holder, zip_id);
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }

        store
            .transaction(|txn| {
                let mut zip = txn.get(zip_id)?.ok_or(StorageError::RecordNotFound(zip_id))?;
                zip.set("city", survivor_id);
                txn.update(zip)?;
                txn.retire(old_id, survivor_id)
            })
            .unwrap();

        let (gone, successor) = store
            .read(|txn| Ok::<_, StorageError>((txn.get(old_id)?, txn.successor(old_id)?)))
            .unwrap();
        assert!(gone.is_none());
        assert_eq!(successor, Some(survivor_id));
    }

    #[test]
    fn retired_ids_are_never_reused() {
        let store = InMemoryRecordStore::new();
        let old = city("ALAMEDA");
        let survivor = city("Alameda");
        let old_copy = old.clone();
        let (old_id, survivor_id) = (old.id, survivor.id);

        store
            .transaction(|txn| {
                txn.insert(old)?;
                txn.insert(survivor)?;
                txn.retire(old_id, survivor_id)
            })
            .unwrap();

        let reinsert: Result<Record, StorageError> = store.transaction(|txn| txn.insert(old_copy.clone()));
        assert!(matches!(reinsert, Err(StorageError::Retired(_))));
        let reupdate: Result<Record, StorageError> = store.transaction(|txn| txn.update(old_copy.clone()));
        assert!(matches!(reupdate, Err(StorageError::Retired(_))));
    }

    /// Inserts `len + 1` cities and retires each into the next one.
    fn forwarding_chain(store: &InMemoryRecordStore, len: usize) -> (RecordId, RecordId) {
        let ids: Vec<RecordId> = (0..=len).map(|_| RecordId::new()).collect();
        store
            .transaction(|txn| {
                for (i, id) in ids.iter().enumerate() {
                    txn.insert(Record::new("city", *id).with("name", format!("c{i}")))?;
                }
                for pair in ids.windows(2) {
                    txn.retire(pair[0], pair[1])?;
                }
                Ok::<_, StorageError>(())
            })
            .unwrap();
        (ids[0], ids[len])
    }

    #[test]
    fn successor_chain_resolves_up_to_the_hop_limit() {
        let store = InMemoryRecordStore::new();
        let (first, last) = forwarding_chain(&store, 3);

        let resolved = store.read(|txn| resolve_successor(txn, first, 3)).unwrap();
        assert_eq!(resolved, last);

        let live = store.read(|txn| resolve_successor(txn, last, 0)).unwrap();
        assert_eq!(live, last);
    }

    #[test]
    fn successor_chain_past_the_hop_limit_fails() {
        let store = InMemoryRecordStore::new();
        let (first, _) = forwarding_chain(&store, 3);

        let err = store
            .read(|txn| resolve_successor(txn, first, 2))
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[test]
    fn snapshot_round_trip_preserves_records_and_successors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = InMemoryRecordStore::new();
        let old = city("ALAMEDA");
        let survivor = city("Alameda").with("aliases", "ALAMEDA");
        let (old_id, survivor_id) = (old.id, survivor.id);
        store
            .transaction(|txn| {
                txn.insert(old)?;
                txn.insert(survivor)?;
                txn.retire(old_id, survivor_id)
            })
            .unwrap();
        store.write_snapshot(&path).unwrap();

        let reopened = InMemoryRecordStore::open_snapshot(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        let (survivor, successor) = reopened
            .read(|txn| Ok::<_, StorageError>((txn.get(survivor_id)?, txn.successor(old_id)?)))
            .unwrap();
        assert_eq!(survivor.unwrap().text("aliases"), Some("ALAMEDA"));
        assert_eq!(successor, Some(survivor_id));

        // New inserts continue the sequence rather than colliding with it.
        let fresh = reopened
            .transaction(|txn| txn.insert(city("Berkeley")))
            .unwrap();
        assert_eq!(fresh.sequence, 2);
    }

    #[test]
    fn open_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            InMemoryRecordStore::open_snapshot(&path),
            Err(StorageError::Snapshot(_))
        ));
    }
}
