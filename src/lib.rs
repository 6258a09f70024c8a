//! # civic-dedupe - Alias-based deduplication for civic localities
//!
//! Records about cities, counties, states and ZIP codes arrive from many
//! sources under many spellings. This crate keeps one canonical entity per
//! real-world place and lets callers reach it by any known name.
//!
//! ## Core Concepts
//!
//! - **Identifying value**: the property an entity is looked up by (a city's
//!   `name`, a state's `short_name`)
//! - **Aliases**: other spellings of the identifying value, stored as
//!   comma-joined text
//! - **Alias registry**: lookup by exact value or alias, and the guard that
//!   refuses to create an entity under someone else's alias
//! - **Merge engine**: when a save makes one entity an alias of another, the
//!   two are merged, references re-pointed and the absorbed record retired
//!
//! ## Usage
//!
//! ```rust
//! use civic_dedupe::civic::City;
//! use civic_dedupe::{DedupeEngine, Lookup};
//!
//! let engine = DedupeEngine::in_memory();
//! engine.save(City::new("ALAMEDA"))?;
//! let mut alamo = engine.save(City::new("Alamo"))?.entity;
//!
//! // Alamo now claims "Alameda": the two cities are merged into Alamo.
//! alamo.aliases = Some("Alameda".to_string());
//! let saved = engine.save(alamo)?;
//! assert_eq!(saved.merge.map(|m| m.absorbed.len()), Some(1));
//!
//! let found: City = engine.find("ALAMEDA", &Lookup::new())?;
//! assert_eq!(found.name, "Alamo");
//! # Ok::<(), civic_dedupe::DedupeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Records and storage
pub mod alias;
pub mod model;
pub mod query;
pub mod record;
pub mod storage;

// Dedupe core
pub mod engine;
pub mod error;
pub mod merge;
pub mod registry;
pub mod relationship;

// Domain and I/O
pub mod civic;
pub mod config;
pub mod interchange;

// Re-export primary types at crate root for convenience
pub use alias::{normalize_aliases, AliasSet, ALIASES_FIELD, ALIAS_SEPARATOR};
pub use config::{ConfigError, DedupeConfig};
pub use engine::{DedupeEngine, Saved};
pub use error::{DedupeError, DedupeResult, ValidationError};
pub use interchange::{AliasRow, LoadReport};
pub use merge::MergeReport;
pub use model::{Dedupe, Model};
pub use query::{Filter, FilterOp, Lookup};
pub use record::{FieldValue, Record, RecordId};
pub use relationship::{Reference, RelationshipRegistry};
pub use storage::{InMemoryRecordStore, RecordStore, RecordTxn, StorageError};
