//! Relationship registry.
//!
//! Every (table, field) pair that can hold a reference to an entity table is
//! declared up front. When an entity is absorbed by a merge, the merge engine
//! walks the declarations for its table and re-points each matching row at
//! the survivor. The store independently refuses to retire a record that is
//! still referenced, so a missing declaration aborts the merge instead of
//! leaving a dangling id behind.

use std::collections::BTreeMap;

use crate::civic::{Benefactor, City, County, State, ZipCode};
use crate::model::Model;

/// A field on `table` that references records of some target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Table holding the reference.
    pub table: &'static str,
    /// Field holding the reference.
    pub field: &'static str,
}

/// Target table -> inbound references.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    inbound: BTreeMap<&'static str, Vec<Reference>>,
}

impl RelationshipRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The locality relationships: the city -> county -> state hierarchy, zip
    /// codes, and finance benefactor addresses.
    #[must_use]
    pub fn civic() -> Self {
        Self::new()
            .with::<City, County>("county")
            .with::<City, State>("state")
            .with::<County, State>("state")
            .with::<ZipCode, City>("city")
            .with::<ZipCode, County>("county")
            .with::<ZipCode, State>("state")
            .with::<Benefactor, City>("city")
            .with::<Benefactor, State>("state")
            .with::<Benefactor, ZipCode>("zip_code")
    }

    /// Declares that `Holder.field` references `Target`.
    #[must_use]
    pub fn with<Holder: Model, Target: Model>(mut self, field: &'static str) -> Self {
        self.declare(Target::TABLE, Holder::TABLE, field);
        self
    }

    /// Declares that `table.field` references records of `target`.
    /// Duplicate declarations are ignored.
    pub fn declare(&mut self, target: &'static str, table: &'static str, field: &'static str) {
        let reference = Reference { table, field };
        let refs = self.inbound.entry(target).or_default();
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }

    /// References that may point at records of `target`.
    #[must_use]
    pub fn inbound(&self, target: &str) -> &[Reference] {
        self.inbound.get(target).map_or(&[], Vec::as_slice)
    }

    /// Number of declared references across all targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inbound.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty()
    }
}
