//! Abstract storage traits.
//!
//! The dedupe core never talks to a database directly. It reads and writes
//! [`Record`]s through [`RecordTxn`], and groups every multi-step write
//! (normalize, persist, reconcile, migrate, retire) into one
//! [`RecordStore::transaction`] so a failed merge leaves nothing behind.

use thiserror::Error;

use crate::query::Lookup;
use crate::record::{Record, RecordId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record not found.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(RecordId),

    /// The id belonged to a record that was merged away; ids are never reused.
    #[error("Record {0} has been retired")]
    Retired(RecordId),

    /// Retiring the record would leave a reference pointing at it.
    #[error("Cannot retire {id}: still referenced by {table}.{field} on {holder}")]
    DanglingReference {
        /// The record being retired.
        id: RecordId,
        /// Table of the record still holding the reference.
        table: String,
        /// Field holding the reference.
        field: String,
        /// Record still holding the reference.
        holder: RecordId,
    },

    /// A record could not be converted into its typed model.
    #[error("Invalid {table} record {id}: {reason}")]
    InvalidRecord {
        /// Table name.
        table: String,
        /// Record id.
        id: RecordId,
        /// What was wrong.
        reason: String,
    },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Snapshot (de)serialization failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Read/write access to records, either a plain view or an open transaction.
pub trait RecordTxn {
    /// Get a live record by id.
    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError>;

    /// All live records of `table` matching `lookup`, in insertion order.
    fn select(&self, table: &str, lookup: &Lookup) -> Result<Vec<Record>, StorageError>;

    /// Insert a new record. Fails if the id is live or retired.
    ///
    /// Returns the stored record with `version`, `sequence` and timestamps set.
    fn insert(&mut self, record: Record) -> Result<Record, StorageError>;

    /// Replace an existing live record, bumping its version.
    fn update(&mut self, record: Record) -> Result<Record, StorageError>;

    /// Delete `id` and remember `successor` as the record that absorbed it.
    ///
    /// # Errors
    /// - `RecordNotFound`: `id` is not live
    /// - `DanglingReference`: some live record still references `id`
    fn retire(&mut self, id: RecordId, successor: RecordId) -> Result<(), StorageError>;

    /// The record that absorbed `id`, if `id` was retired.
    fn successor(&self, id: RecordId) -> Result<Option<RecordId>, StorageError>;
}

/// A record store with atomic transactions.
///
/// # Safety Considerations
/// - `transaction` must apply all or none of the writes made by the closure
/// - Concurrent transactions must be serialized (one writer at a time)
pub trait RecordStore: Send + Sync {
    /// Run `work` against a consistent read-only view.
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn RecordTxn) -> Result<T, E>;

    /// Run `work` inside a transaction. Writes are committed only if `work`
    /// returns `Ok`; on `Err` the store is left exactly as it was.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn RecordTxn) -> Result<T, E>;
}

/// Follows successor links from `id` to the live record that absorbed it.
///
/// Returns `id` itself when it was never retired. A chain of exactly
/// `hop_limit` links resolves; `hop_limit = 0` only accepts live ids.
///
/// # Errors
/// - `Backend`: the chain is cyclic or longer than `hop_limit`
pub fn resolve_successor(
    txn: &dyn RecordTxn,
    id: RecordId,
    hop_limit: usize,
) -> Result<RecordId, StorageError> {
    let mut current = id;
    for _ in 0..=hop_limit {
        let Some(next) = txn.successor(current)? else {
            return Ok(current);
        };
        if next == current {
            return Err(StorageError::Backend(
                "successor map contains a self-cycle".to_string(),
            ));
        }
        current = next;
    }

    Err(StorageError::Backend(
        "successor resolution exceeded hop limit".to_string(),
    ))
}
