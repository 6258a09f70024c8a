//! Merge engine.
//!
//! After an entity with aliases is saved, any *other* live entity of the same
//! table whose identifying value case-insensitively equals one of those
//! aliases denotes the same real thing and is absorbed:
//!
//! 1. pick the survivor (see [`reconcile`] for the direction rule)
//! 2. union the alias sets into the survivor and update it if changed
//! 3. re-point every declared inbound reference at the survivor
//! 4. retire the absorbed records, forwarding their ids to the survivor
//!
//! All steps run against the caller's transaction; the engine commits or
//! discards them together.

use std::collections::HashSet;

use tracing::info;

use crate::alias::AliasSet;
use crate::error::DedupeResult;
use crate::model::Dedupe;
use crate::query::Lookup;
use crate::record::{FieldValue, RecordId};
use crate::registry::{require, select};
use crate::relationship::RelationshipRegistry;
use crate::storage::RecordTxn;

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Table the merged entities belong to.
    pub table: &'static str,
    /// The entity that remains live.
    pub survivor: RecordId,
    /// Entities folded into the survivor and retired.
    pub absorbed: Vec<RecordId>,
    /// Reference fields re-pointed at the survivor.
    pub migrated: usize,
    /// Whether the survivor's alias text changed.
    pub aliases_updated: bool,
    /// Whether the saved entity was itself absorbed by a richer match.
    pub flipped: bool,
}

/// Other live entities identified by one of `instance`'s aliases.
fn remote_matches<T: Dedupe>(txn: &dyn RecordTxn, instance: &T) -> DedupeResult<Vec<T>> {
    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for alias in AliasSet::from_field(instance.aliases()).iter() {
        let lookup = Lookup::new().iexact(T::IDENTIFYING_PROPERTY, alias);
        for candidate in select::<T>(txn, &lookup)? {
            if candidate.id() != instance.id() && seen.insert(candidate.id()) {
                matches.push(candidate);
            }
        }
    }
    Ok(matches)
}

/// Merges every entity that `instance`'s aliases identify into one survivor.
///
/// Direction: when exactly one remote match exists and it already carries
/// aliases, it survives and `instance` is absorbed. Otherwise `instance`
/// survives and absorbs every match.
///
/// The survivor's widened alias set is reconciled again, as a re-save would,
/// until no live entity matches it. Every round retires at least one record,
/// so this terminates.
///
/// Returns the survivor as stored after the merge and a report, or
/// `instance` unchanged and `None` when nothing matched. Running it again on
/// the result finds nothing and writes nothing.
///
/// # Errors
/// Any store error aborts the merge; the caller must discard the
/// transaction. In particular `DanglingReference` means some record still
/// points at an absorbed entity through a field the registry does not declare.
pub fn reconcile<T: Dedupe>(
    txn: &mut dyn RecordTxn,
    relationships: &RelationshipRegistry,
    instance: T,
) -> DedupeResult<(T, Option<MergeReport>)> {
    let saved_id = instance.id();
    let mut current = instance;
    let mut total: Option<MergeReport> = None;

    while let Some((survivor, round)) = merge_round(txn, relationships, current.clone())? {
        current = survivor;
        total = Some(match total {
            None => round,
            Some(mut acc) => {
                acc.survivor = round.survivor;
                acc.absorbed.extend(round.absorbed);
                acc.migrated += round.migrated;
                acc.aliases_updated |= round.aliases_updated;
                acc
            }
        });
    }

    if let Some(report) = total.as_mut() {
        report.flipped = report.survivor != saved_id;
        info!(
            table = report.table,
            survivor = %report.survivor,
            absorbed = report.absorbed.len(),
            migrated = report.migrated,
            flipped = report.flipped,
            "merged aliased entities"
        );
    }
    Ok((current, total))
}

/// One merge step: absorb the current remote matches of `instance`.
fn merge_round<T: Dedupe>(
    txn: &mut dyn RecordTxn,
    relationships: &RelationshipRegistry,
    instance: T,
) -> DedupeResult<Option<(T, MergeReport)>> {
    if instance.aliases().is_none() {
        return Ok(None);
    }

    let mut remote = remote_matches(&*txn, &instance)?;
    if remote.is_empty() {
        return Ok(None);
    }

    let flipped = remote.len() == 1 && remote[0].aliases().is_some();
    let (mut survivor, absorbed) = if flipped {
        (remote.remove(0), vec![instance])
    } else {
        (instance, remote)
    };
    let survivor_id = survivor.id();

    let mut merged = AliasSet::from_field(survivor.aliases());
    for entity in &absorbed {
        if let Some(value) = entity.identifying_value() {
            merged.insert(value);
        }
        merged.extend(AliasSet::from_field(entity.aliases()).iter());
    }
    if let Some(own) = survivor.identifying_value() {
        merged.remove(own);
    }

    let merged_text = merged.to_text();
    let aliases_updated = merged_text.as_deref() != survivor.aliases();
    if aliases_updated {
        survivor.set_aliases(merged_text);
        txn.update(survivor.to_record())?;
    }

    let mut migrated = 0;
    for entity in &absorbed {
        for reference in relationships.inbound(T::TABLE) {
            let holders = txn.select(reference.table, &Lookup::new().eq(reference.field, entity.id()))?;
            for mut holder in holders {
                holder.set(reference.field, FieldValue::Ref(survivor_id));
                txn.update(holder)?;
                migrated += 1;
            }
        }
        txn.retire(entity.id(), survivor_id)?;
    }

    let report = MergeReport {
        table: T::TABLE,
        survivor: survivor_id,
        absorbed: absorbed.iter().map(|entity| entity.id()).collect(),
        migrated,
        aliases_updated,
        flipped,
    };
    let survivor = require::<T>(&*txn, survivor_id)?;
    Ok(Some((survivor, report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civic::{Address, Benefactor, City};
    use crate::error::DedupeError;
    use crate::model::Model;
    use crate::storage::{InMemoryRecordStore, RecordStore, StorageError};

    fn insert<M: Model>(store: &InMemoryRecordStore, model: &M) {
        store
            .transaction(|txn| txn.insert(model.to_record()).map(|_| ()))
            .unwrap();
    }

    fn run(store: &InMemoryRecordStore, city: City) -> DedupeResult<(City, Option<MergeReport>)> {
        let relationships = RelationshipRegistry::civic();
        store.transaction(|txn| {
            let stored = txn.update(city.to_record())?;
            reconcile(txn, &relationships, City::from_record(&stored)?)
        })
    }

    #[test]
    fn no_aliases_is_a_no_op() {
        let store = InMemoryRecordStore::new();
        let city = City::new("Oakland");
        insert(&store, &city);
        let (_, report) = run(&store, city).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn instance_absorbs_plain_match() {
        let store = InMemoryRecordStore::new();
        let mut alamo = City::new("Alamo");
        let alameda = City::new("ALAMEDA");
        insert(&store, &alamo);
        insert(&store, &alameda);

        alamo.aliases = Some("Alameda".to_string());
        let (survivor, report) = run(&store, alamo.clone()).unwrap();
        let report = report.unwrap();

        assert_eq!(survivor.id, alamo.id);
        assert_eq!(survivor.aliases.as_deref(), Some("Alameda,ALAMEDA"));
        assert_eq!(report.absorbed, vec![alameda.id]);
        assert!(!report.flipped);
        assert!(report.aliases_updated);
        assert_eq!(store.table_len("city").unwrap(), 1);
    }

    #[test]
    fn richer_single_match_survives() {
        let store = InMemoryRecordStore::new();
        let mut a = City::new("A");
        let mut b = City::new("x");
        b.aliases = Some("p,q".to_string());
        insert(&store, &a);
        insert(&store, &b);

        a.aliases = Some("x".to_string());
        let (survivor, report) = run(&store, a.clone()).unwrap();
        let report = report.unwrap();

        assert!(report.flipped);
        assert_eq!(survivor.id, b.id);
        assert_eq!(survivor.aliases.as_deref(), Some("p,q,A"));
        assert_eq!(report.absorbed, vec![a.id]);
    }

    #[test]
    fn flipped_survivor_absorbs_its_new_alias() {
        let store = InMemoryRecordStore::new();
        let lower = City::new("a");
        let mut upper = City::new("A");
        let mut rich = City::new("x");
        rich.aliases = Some("p,q".to_string());
        insert(&store, &lower);
        insert(&store, &upper);
        insert(&store, &rich);

        upper.aliases = Some("x".to_string());
        let (survivor, report) = run(&store, upper.clone()).unwrap();
        let report = report.unwrap();

        assert!(report.flipped);
        assert_eq!(survivor.id, rich.id);
        assert_eq!(survivor.aliases.as_deref(), Some("p,q,A,a"));
        assert_eq!(report.absorbed, vec![upper.id, lower.id]);
        assert_eq!(store.table_len("city").unwrap(), 1);
    }

    #[test]
    fn references_follow_the_survivor() {
        let store = InMemoryRecordStore::new();
        let mut alamo = City::new("Alamo");
        let alameda = City::new("Alameda");
        let donor = Benefactor::new(
            "Donor",
            Address {
                city: Some(alameda.id),
                ..Address::default()
            },
        );
        insert(&store, &alamo);
        insert(&store, &alameda);
        insert(&store, &donor);

        alamo.aliases = Some("alameda".to_string());
        let (_, report) = run(&store, alamo.clone()).unwrap();
        assert_eq!(report.unwrap().migrated, 1);

        let donor = store
            .read(|txn| require::<Benefactor>(txn, donor.id))
            .unwrap();
        assert_eq!(donor.address.city, Some(alamo.id));
    }

    #[test]
    fn undeclared_reference_aborts_merge() {
        let store = InMemoryRecordStore::new();
        let mut alamo = City::new("Alamo");
        let alameda = City::new("Alameda");
        let donor = Benefactor::new(
            "Donor",
            Address {
                city: Some(alameda.id),
                ..Address::default()
            },
        );
        insert(&store, &alamo);
        insert(&store, &alameda);
        insert(&store, &donor);

        alamo.aliases = Some("Alameda".to_string());
        let empty = RelationshipRegistry::new();
        let err = store
            .transaction(|txn| {
                txn.update(alamo.to_record())?;
                reconcile(txn, &empty, alamo.clone())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DedupeError::Storage(StorageError::DanglingReference { .. })
        ));
        assert_eq!(store.table_len("city").unwrap(), 2);
    }

    #[test]
    fn second_pass_finds_nothing() {
        let store = InMemoryRecordStore::new();
        let mut alamo = City::new("Alamo");
        insert(&store, &alamo);
        insert(&store, &City::new("Alameda"));

        alamo.aliases = Some("Alameda".to_string());
        let (survivor, _) = run(&store, alamo).unwrap();
        let version = |store: &InMemoryRecordStore| {
            store
                .read(|txn| txn.get(survivor.id))
                .unwrap()
                .map(|record| record.version)
        };
        let before = version(&store);

        let relationships = RelationshipRegistry::civic();
        let (again, report) = store
            .transaction(|txn| reconcile(txn, &relationships, survivor.clone()))
            .unwrap();
        assert!(report.is_none());
        assert_eq!(again, survivor);
        assert_eq!(version(&store), before);
    }
}
