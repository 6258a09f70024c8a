//! Dedupe engine.
//!
//! [`DedupeEngine`] is the entry point collaborators (importers, views, the
//! CLI) call into. Every write runs as one store transaction; `save` is an
//! explicit pipeline:
//!
//! ```text
//! normalize -> guard -> persist -> reconcile -> validate ownership
//! ```
//!
//! If any stage fails, nothing the pipeline wrote is kept.

use std::sync::Arc;

use crate::config::DedupeConfig;
use crate::error::DedupeResult;
use crate::merge::{self, MergeReport};
use crate::model::{Dedupe, Model};
use crate::query::Lookup;
use crate::record::{Record, RecordId};
use crate::registry;
use crate::relationship::RelationshipRegistry;
use crate::storage::{resolve_successor, InMemoryRecordStore, RecordStore, RecordTxn};

/// Result of [`DedupeEngine::save`].
#[derive(Debug, Clone)]
pub struct Saved<T> {
    /// The live entity after the save. When the saved entity was absorbed by
    /// a richer match, this is that match.
    pub entity: T,
    /// The merge the save triggered, if any.
    pub merge: Option<MergeReport>,
}

impl<T> Saved<T> {
    /// Returns true if the saved entity itself was merged away.
    #[must_use]
    pub fn was_absorbed(&self) -> bool {
        self.merge.as_ref().is_some_and(|m| m.flipped)
    }
}

/// Alias-aware lookup, creation and save over a record store.
pub struct DedupeEngine<S: RecordStore = InMemoryRecordStore> {
    store: Arc<S>,
    relationships: RelationshipRegistry,
    config: DedupeConfig,
}

impl DedupeEngine<InMemoryRecordStore> {
    /// An engine over a fresh in-memory store with the civic relationships.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRecordStore::new()),
            RelationshipRegistry::civic(),
            DedupeConfig::default(),
        )
    }
}

impl<S: RecordStore> DedupeEngine<S> {
    /// Create a new engine.
    #[must_use]
    pub fn new(store: Arc<S>, relationships: RelationshipRegistry, config: DedupeConfig) -> Self {
        Self {
            store,
            relationships,
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The declared relationships.
    #[must_use]
    pub fn relationships(&self) -> &RelationshipRegistry {
        &self.relationships
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    /// Finds the entity known by `value`, exactly or through an alias.
    ///
    /// # Errors
    /// - `NotFound`, `MultipleMatches`, `UnsupportedQuery`, store errors
    pub fn find<T: Dedupe>(&self, value: &str, scope: &Lookup) -> DedupeResult<T> {
        self.store.read(|txn| registry::find::<T>(txn, value, scope))
    }

    /// Returns the exact match for `value` within `scope`, or creates it.
    /// Returns `(entity, created)`.
    ///
    /// # Errors
    /// - `ConflictingAlias`: `value` is already another entity's alias
    /// - `MultipleMatches`, `UnsupportedQuery`, validation and store errors
    pub fn get_or_create<T: Dedupe>(&self, value: &str, scope: &Lookup) -> DedupeResult<(T, bool)> {
        let max = self.config.max_alias_text_len;
        self.store
            .transaction(|txn| registry::get_or_create::<T>(txn, value, scope, max))
    }

    /// Resolves `value` through [`Self::find`], creating it on a miss.
    /// Returns `(entity, created)`.
    ///
    /// # Errors
    /// - `ConflictingAlias`: `value` is an alias that does not resolve
    ///   within `scope`
    /// - `MultipleMatches`, `UnsupportedQuery`, validation and store errors
    pub fn find_or_create<T: Dedupe>(&self, value: &str, scope: &Lookup) -> DedupeResult<(T, bool)> {
        let max = self.config.max_alias_text_len;
        self.store
            .transaction(|txn| registry::find_or_create::<T>(txn, value, scope, max))
    }

    /// Returns true if any live entity of `T` lists `value` as an alias.
    ///
    /// # Errors
    /// - store errors
    pub fn is_aliased<T: Dedupe>(&self, value: &str) -> DedupeResult<bool> {
        self.store.read(|txn| registry::is_aliased::<T>(txn, value))
    }

    /// Saves `entity` and merges whatever its aliases now identify.
    ///
    /// # Errors
    /// - `ConflictingAlias`: the identifying value is another entity's alias,
    ///   or after merging an alias is still shared with another entity
    /// - `Validation`: empty identifying value or oversized alias text
    /// - `Storage`: including `Retired` when saving an absorbed entity and
    ///   `DanglingReference` when a merge meets an undeclared reference
    pub fn save<T: Dedupe>(&self, entity: T) -> DedupeResult<Saved<T>> {
        self.store.transaction(|txn| self.save_in(txn, entity))
    }

    /// [`Self::save`] inside a caller's transaction.
    pub(crate) fn save_in<T: Dedupe>(&self, txn: &mut dyn RecordTxn, mut entity: T) -> DedupeResult<Saved<T>> {
        registry::normalize_and_validate(&mut entity, self.config.max_alias_text_len)?;
        registry::guard_identifying_value(&*txn, &entity)?;

        let stored = persist(txn, entity.to_record())?;
        let entity = T::from_record(&stored)?;

        let (entity, merge) = merge::reconcile(txn, &self.relationships, entity)?;
        registry::check_alias_len(&entity, self.config.max_alias_text_len)?;
        registry::check_alias_ownership(&*txn, &entity)?;

        Ok(Saved { entity, merge })
    }

    /// Runs reconciliation for the stored entity `id` without modifying it.
    ///
    /// A no-op on an already-merged state.
    ///
    /// # Errors
    /// - `Storage(RecordNotFound)`: `id` is not live
    /// - the same merge and ownership errors as [`Self::save`]
    pub fn reconcile<T: Dedupe>(&self, id: RecordId) -> DedupeResult<Option<MergeReport>> {
        self.store.transaction(|txn| {
            let entity = registry::require::<T>(&*txn, id)?;
            let (entity, merge) = merge::reconcile(txn, &self.relationships, entity)?;
            registry::check_alias_ownership(&*txn, &entity)?;
            Ok(merge)
        })
    }

    /// Writes a model that does not take part in deduplication, such as a
    /// finance record referencing localities.
    ///
    /// Dedupable entities must go through [`Self::save`] instead.
    ///
    /// # Errors
    /// - store errors
    pub fn put<M: Model>(&self, model: &M) -> DedupeResult<M> {
        self.store.transaction(|txn| {
            let stored = persist(txn, model.to_record())?;
            Ok(M::from_record(&stored)?)
        })
    }

    /// Loads a live model by id.
    ///
    /// # Errors
    /// - store errors
    pub fn get<M: Model>(&self, id: RecordId) -> DedupeResult<Option<M>> {
        self.store.read(|txn| registry::load::<M>(txn, id))
    }

    /// Loads every live model of `M` matching `lookup`, in insertion order.
    ///
    /// # Errors
    /// - store errors
    pub fn select<M: Model>(&self, lookup: &Lookup) -> DedupeResult<Vec<M>> {
        self.store.read(|txn| registry::select::<M>(txn, lookup))
    }

    /// Follows merge forwarding from `id` to the live record that absorbed it.
    ///
    /// # Errors
    /// - `Backend`: the forwarding chain exceeds `successor_hop_limit`
    pub fn canonical_id(&self, id: RecordId) -> DedupeResult<RecordId> {
        let limit = self.config.successor_hop_limit;
        self.store
            .read(|txn| Ok(resolve_successor(txn, id, limit)?))
    }
}

/// Updates a live record, inserting it if it has never been stored.
fn persist(txn: &mut dyn RecordTxn, record: Record) -> DedupeResult<Record> {
    if txn.get(record.id)?.is_some() {
        Ok(txn.update(record)?)
    } else {
        Ok(txn.insert(record)?)
    }
}
