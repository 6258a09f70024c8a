//! Error types for the dedupe core.
//!
//! All errors are strongly typed using thiserror. Lookup failures
//! (`NotFound`, `ConflictingAlias`, `UnsupportedQuery`) are ordinary,
//! recoverable outcomes for callers; storage failures inside a save abort the
//! whole transaction and propagate unchanged.

use thiserror::Error;

use crate::record::RecordId;
use crate::storage::StorageError;

/// Validation errors raised before anything is written.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The identifying value is missing or blank.
    #[error("{table}.{property} cannot be empty")]
    EmptyIdentifyingValue {
        table: &'static str,
        property: &'static str,
    },

    /// The identifying value has leading or trailing whitespace, so exact
    /// lookups of the trimmed value would miss it.
    #[error("{table}.{property} {value:?} has surrounding whitespace")]
    UntrimmedIdentifyingValue {
        table: &'static str,
        property: &'static str,
        value: String,
    },

    /// The normalized alias text does not fit the configured limit.
    #[error("Alias text for {table} {id} is {len} bytes, exceeding the maximum of {max}")]
    AliasTextTooLong {
        table: &'static str,
        id: RecordId,
        len: usize,
        max: usize,
    },
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum DedupeError {
    /// Neither an exact nor an aliased match exists.
    #[error("No {table} with {property}={value:?}")]
    NotFound {
        table: &'static str,
        property: &'static str,
        value: String,
    },

    /// More than one entity lists `value` as an alias. Never returned by the
    /// lookup API: `find` reports it as `NotFound`.
    #[error("{candidates} {table} entities list {value:?} as an alias")]
    AmbiguousAlias {
        table: &'static str,
        value: String,
        candidates: usize,
    },

    /// An exact lookup matched more than one entity.
    #[error("{count} {table} entities have {property}={value:?}")]
    MultipleMatches {
        table: &'static str,
        property: &'static str,
        value: String,
        count: usize,
    },

    /// The value is already registered as an alias of another entity.
    #[error("{value:?} is already an alias of {table} {holder}")]
    ConflictingAlias {
        table: &'static str,
        value: String,
        holder: RecordId,
    },

    /// The lookup shape is not supported by the alias-aware layer.
    #[error("Unsupported {table} query on '{field}': {reason}")]
    UnsupportedQuery {
        table: &'static str,
        field: String,
        reason: &'static str,
    },

    /// Validation failed before anything was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store failure; aborts the enclosing transaction.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Malformed interchange file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O failure reading or writing an interchange file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DedupeError {
    /// Returns true if this is a `NotFound` error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a `ConflictingAlias` error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictingAlias { .. })
    }

    /// Returns true if this is an `UnsupportedQuery` error.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedQuery { .. })
    }

    /// Returns true if this error came from the record store.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for dedupe operations.
pub type DedupeResult<T> = Result<T, DedupeError>;
