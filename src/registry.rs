//! Alias registry.
//!
//! Alias-aware lookup and the creation guard. Every function here runs against
//! a [`RecordTxn`], so the engine can compose them inside one store
//! transaction together with persistence and reconciliation.
//!
//! Lookup order for a value `v` of a type keyed by property `p`:
//! 1. exact: `p == v` within the scope filters
//! 2. aliased: the single entity within scope whose alias set contains `v`
//!
//! An aliased search that hits several entities is reported as `NotFound`.

use tracing::{debug, warn};

use crate::alias::{normalize_aliases, AliasSet, ALIASES_FIELD};
use crate::error::{DedupeError, DedupeResult, ValidationError};
use crate::model::{Dedupe, Model};
use crate::query::Lookup;
use crate::record::{Record, RecordId};
use crate::storage::{RecordTxn, StorageError};

/// Rejects scope filters the alias-aware layer cannot honor.
///
/// # Errors
/// - `UnsupportedQuery`: a filter targets the identifying property (the
///   value is matched separately, exactly or by alias) or the alias field
pub fn check_supported<T: Dedupe>(scope: &Lookup) -> DedupeResult<()> {
    for filter in scope.filters() {
        let reason = if filter.field == T::IDENTIFYING_PROPERTY {
            if filter.op.is_partial() {
                "partial or derived matches on the identifying property are not supported"
            } else {
                "the identifying value is passed separately, not as a scope filter"
            }
        } else if filter.field == ALIASES_FIELD {
            "the alias field cannot be queried directly"
        } else {
            continue;
        };

        return Err(DedupeError::UnsupportedQuery {
            table: T::TABLE,
            field: filter.field.clone(),
            reason,
        });
    }
    Ok(())
}

/// Loads a live model by id.
///
/// # Errors
/// - store errors, or a record that does not convert into `M`
pub fn load<M: Model>(txn: &dyn RecordTxn, id: RecordId) -> DedupeResult<Option<M>> {
    txn.get(id)?
        .map(|record| M::from_record(&record))
        .transpose()
        .map_err(DedupeError::from)
}

/// Loads every live model of `M`'s table matching `lookup`.
///
/// # Errors
/// - store errors, or a record that does not convert into `M`
pub fn select<M: Model>(txn: &dyn RecordTxn, lookup: &Lookup) -> DedupeResult<Vec<M>> {
    txn.select(M::TABLE, lookup)?
        .iter()
        .map(|record| M::from_record(record).map_err(DedupeError::from))
        .collect()
}

/// Exact lookup of `value` within `scope`.
///
/// # Errors
/// - `MultipleMatches`: more than one entity has this exact value
pub fn get_exact<T: Dedupe>(
    txn: &dyn RecordTxn,
    value: &str,
    scope: &Lookup,
) -> DedupeResult<Option<T>> {
    let lookup = scope.clone().eq(T::IDENTIFYING_PROPERTY, value);
    let mut matches = select::<T>(txn, &lookup)?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(DedupeError::MultipleMatches {
            table: T::TABLE,
            property: T::IDENTIFYING_PROPERTY,
            value: value.to_string(),
            count,
        }),
    }
}

/// Aliased lookup of `value` within `scope`.
///
/// # Errors
/// - `AmbiguousAlias`: more than one entity lists `value` as an alias
pub(crate) fn get_aliased<T: Dedupe>(
    txn: &dyn RecordTxn,
    value: &str,
    scope: &Lookup,
) -> DedupeResult<Option<T>> {
    let mut candidates: Vec<Record> = txn
        .select(T::TABLE, scope)?
        .into_iter()
        .filter(|record| AliasSet::from_field(record.text(ALIASES_FIELD)).contains(value))
        .collect();

    match candidates.len() {
        0 => Ok(None),
        1 => match candidates.pop() {
            Some(record) => Ok(Some(T::from_record(&record)?)),
            None => Ok(None),
        },
        count => Err(DedupeError::AmbiguousAlias {
            table: T::TABLE,
            value: value.to_string(),
            candidates: count,
        }),
    }
}

fn not_found<T: Dedupe>(value: &str) -> DedupeError {
    DedupeError::NotFound {
        table: T::TABLE,
        property: T::IDENTIFYING_PROPERTY,
        value: value.to_string(),
    }
}

/// Finds the entity known by `value`, exactly or through its aliases.
///
/// # Errors
/// - `NotFound`: no exact match and no single aliased match
/// - `MultipleMatches`: the exact lookup is ambiguous
/// - `UnsupportedQuery`: see [`check_supported`]
pub fn find<T: Dedupe>(txn: &dyn RecordTxn, value: &str, scope: &Lookup) -> DedupeResult<T> {
    check_supported::<T>(scope)?;

    if let Some(entity) = get_exact::<T>(txn, value, scope)? {
        return Ok(entity);
    }

    match get_aliased::<T>(txn, value, scope) {
        Ok(Some(entity)) => {
            debug!(table = T::TABLE, value, id = %entity.id(), "resolved through alias");
            Ok(entity)
        }
        Ok(None) => Err(not_found::<T>(value)),
        Err(DedupeError::AmbiguousAlias { candidates, .. }) => {
            warn!(
                table = T::TABLE,
                value, candidates, "alias is claimed by several entities; reporting not found"
            );
            Err(not_found::<T>(value))
        }
        Err(e) => Err(e),
    }
}

/// The live entity (other than `exclude`) whose alias set contains `value`.
///
/// # Errors
/// - store errors
pub fn alias_holder<T: Dedupe>(
    txn: &dyn RecordTxn,
    value: &str,
    exclude: Option<RecordId>,
) -> DedupeResult<Option<RecordId>> {
    Ok(txn
        .select(T::TABLE, &Lookup::new())?
        .into_iter()
        .filter(|record| Some(record.id) != exclude)
        .find(|record| AliasSet::from_field(record.text(ALIASES_FIELD)).contains(value))
        .map(|record| record.id))
}

/// Returns true if any live entity of `T` lists `value` as an alias.
///
/// # Errors
/// - store errors
pub fn is_aliased<T: Dedupe>(txn: &dyn RecordTxn, value: &str) -> DedupeResult<bool> {
    Ok(alias_holder::<T>(txn, value, None)?.is_some())
}

/// Checks the normalized alias text length.
///
/// # Errors
/// - `AliasTextTooLong`
pub fn check_alias_len<T: Dedupe>(entity: &T, max: usize) -> DedupeResult<()> {
    let len = entity.aliases().map_or(0, str::len);
    if len > max {
        return Err(ValidationError::AliasTextTooLong {
            table: T::TABLE,
            id: entity.id(),
            len,
            max,
        }
        .into());
    }
    Ok(())
}

/// Normalizes the alias text in place and validates the entity.
///
/// Runs before every save. Idempotent.
///
/// # Errors
/// - `EmptyIdentifyingValue`: the identifying value is missing or blank
/// - `UntrimmedIdentifyingValue`: the identifying value has surrounding
///   whitespace
/// - `AliasTextTooLong`: the normalized alias text exceeds `max_alias_text_len`
pub fn normalize_and_validate<T: Dedupe>(entity: &mut T, max_alias_text_len: usize) -> DedupeResult<()> {
    let value = entity.identifying_value().unwrap_or_default();
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifyingValue {
            table: T::TABLE,
            property: T::IDENTIFYING_PROPERTY,
        }
        .into());
    }
    if value.trim() != value {
        return Err(ValidationError::UntrimmedIdentifyingValue {
            table: T::TABLE,
            property: T::IDENTIFYING_PROPERTY,
            value: value.to_string(),
        }
        .into());
    }

    let normalized = normalize_aliases(entity.aliases(), entity.identifying_value());
    entity.set_aliases(normalized);
    check_alias_len(entity, max_alias_text_len)
}

/// Refuses to save an entity under a value another entity claims as alias.
///
/// # Errors
/// - `ConflictingAlias`
pub fn guard_identifying_value<T: Dedupe>(txn: &dyn RecordTxn, entity: &T) -> DedupeResult<()> {
    let Some(value) = entity.identifying_value() else {
        return Ok(());
    };
    match alias_holder::<T>(txn, value, Some(entity.id()))? {
        Some(holder) => Err(DedupeError::ConflictingAlias {
            table: T::TABLE,
            value: value.to_string(),
            holder,
        }),
        None => Ok(()),
    }
}

/// Verifies that `entity` owns its aliases and its identifying value.
///
/// Fails if another live entity of the same table shares an alias with it,
/// lists its identifying value as an alias, or is identified by one of its
/// aliases.
///
/// # Errors
/// - `ConflictingAlias`
pub fn check_alias_ownership<T: Dedupe>(txn: &dyn RecordTxn, entity: &T) -> DedupeResult<()> {
    let own = AliasSet::from_field(entity.aliases());
    let value = entity.identifying_value();

    for other in txn.select(T::TABLE, &Lookup::new())? {
        if other.id == entity.id() {
            continue;
        }
        let theirs = AliasSet::from_field(other.text(ALIASES_FIELD));

        let shared = own.iter().find(|alias| theirs.contains(alias));
        let claimed = value.filter(|v| theirs.contains(v));
        if let Some(conflict) = shared.or(claimed) {
            return Err(DedupeError::ConflictingAlias {
                table: T::TABLE,
                value: conflict.to_string(),
                holder: other.id,
            });
        }

        if let Some(other_value) = other.text(T::IDENTIFYING_PROPERTY) {
            if own.contains(other_value) {
                return Err(DedupeError::ConflictingAlias {
                    table: T::TABLE,
                    value: other_value.to_string(),
                    holder: entity.id(),
                });
            }
        }
    }
    Ok(())
}

/// Builds an unsaved entity from its identifying value and the values the
/// scope pins (exact and is-null filters).
///
/// # Errors
/// - the resulting record does not convert into `T`
pub fn build_from_scope<T: Dedupe>(value: &str, scope: &Lookup) -> DedupeResult<T> {
    let mut record = Record::new(T::TABLE, RecordId::new());
    for (field, pinned) in scope.assignments() {
        record.set(field, pinned.clone());
    }
    record.set(T::IDENTIFYING_PROPERTY, value);
    Ok(T::from_record(&record)?)
}

/// Creates `value` within `scope` after checking it is nobody's alias.
fn create<T: Dedupe>(
    txn: &mut dyn RecordTxn,
    value: &str,
    scope: &Lookup,
    max_alias_text_len: usize,
) -> DedupeResult<T> {
    if let Some(holder) = alias_holder::<T>(&*txn, value, None)? {
        return Err(DedupeError::ConflictingAlias {
            table: T::TABLE,
            value: value.to_string(),
            holder,
        });
    }

    let mut entity = build_from_scope::<T>(value, scope)?;
    normalize_and_validate(&mut entity, max_alias_text_len)?;
    let stored = txn.insert(entity.to_record())?;
    debug!(table = T::TABLE, value, id = %stored.id, "created");
    Ok(T::from_record(&stored)?)
}

/// Returns the exact match for `value` within `scope`, or creates it.
///
/// Only the exact lookup is consulted: a value that is already some entity's
/// alias is refused rather than resolved. Returns `(entity, created)`.
///
/// # Errors
/// - `ConflictingAlias`: `value` is already an alias of a live entity
/// - `MultipleMatches`, `UnsupportedQuery`, validation and store errors
pub fn get_or_create<T: Dedupe>(
    txn: &mut dyn RecordTxn,
    value: &str,
    scope: &Lookup,
    max_alias_text_len: usize,
) -> DedupeResult<(T, bool)> {
    check_supported::<T>(scope)?;
    if let Some(entity) = get_exact::<T>(&*txn, value, scope)? {
        return Ok((entity, false));
    }
    create(txn, value, scope, max_alias_text_len).map(|entity| (entity, true))
}

/// Like [`get_or_create`], but resolves aliases through [`find`] first.
///
/// # Errors
/// - `ConflictingAlias`: `value` is an alias, but only of entities outside
///   `scope` or of several entities
/// - `MultipleMatches`, `UnsupportedQuery`, validation and store errors
pub fn find_or_create<T: Dedupe>(
    txn: &mut dyn RecordTxn,
    value: &str,
    scope: &Lookup,
    max_alias_text_len: usize,
) -> DedupeResult<(T, bool)> {
    match find::<T>(&*txn, value, scope) {
        Ok(entity) => Ok((entity, false)),
        Err(DedupeError::NotFound { .. }) => {
            create(txn, value, scope, max_alias_text_len).map(|entity| (entity, true))
        }
        Err(e) => Err(e),
    }
}

/// Loads `id` or fails with `RecordNotFound`.
pub(crate) fn require<M: Model>(txn: &dyn RecordTxn, id: RecordId) -> DedupeResult<M> {
    load::<M>(txn, id)?.ok_or_else(|| StorageError::RecordNotFound(id).into())
}
