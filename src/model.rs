//! Typed models and the dedupe capability.
//!
//! [`Model`] maps a domain struct onto a [`Record`]. [`Dedupe`] is the small
//! accessor interface the alias registry and merge engine work through: which
//! property identifies an entity, and how to read and replace its aliases.
//! Any model can opt in by implementing it; nothing else is required.

use crate::record::{Record, RecordId};
use crate::storage::StorageError;

/// A domain type persisted as a [`Record`].
pub trait Model: Clone + Send + Sync + Sized {
    /// Table name.
    const TABLE: &'static str;

    /// Stable identity.
    fn id(&self) -> RecordId;

    /// Convert to a record. Store-managed fields may be left at defaults.
    fn to_record(&self) -> Record;

    /// Build from a record of [`Self::TABLE`].
    ///
    /// # Errors
    /// - `InvalidRecord`: the record is from another table or a required
    ///   field is missing
    fn from_record(record: &Record) -> Result<Self, StorageError>;
}

/// Alias-based deduplication for a model.
///
/// # Examples
///
/// ```
/// use civic_dedupe::{Dedupe, Model, Record, RecordId, StorageError, ALIASES_FIELD};
///
/// #[derive(Debug, Clone)]
/// struct Employer {
///     id: RecordId,
///     title: String,
///     aliases: Option<String>,
/// }
///
/// impl Model for Employer {
///     const TABLE: &'static str = "employer";
///
///     fn id(&self) -> RecordId {
///         self.id
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new(Self::TABLE, self.id)
///             .with("title", self.title.as_str())
///             .with(ALIASES_FIELD, civic_dedupe::FieldValue::text_opt(self.aliases.as_deref()))
///     }
///
///     fn from_record(record: &Record) -> Result<Self, StorageError> {
///         Ok(Self {
///             id: record.id,
///             title: record.text_owned("title").unwrap_or_default(),
///             aliases: record.text_owned(ALIASES_FIELD),
///         })
///     }
/// }
///
/// impl Dedupe for Employer {
///     const IDENTIFYING_PROPERTY: &'static str = "title";
///
///     fn identifying_value(&self) -> Option<&str> {
///         Some(&self.title)
///     }
///
///     fn aliases(&self) -> Option<&str> {
///         self.aliases.as_deref()
///     }
///
///     fn set_aliases(&mut self, aliases: Option<String>) {
///         self.aliases = aliases;
///     }
/// }
/// ```
pub trait Dedupe: Model {
    /// Field holding the identifying value (e.g. `"name"`).
    const IDENTIFYING_PROPERTY: &'static str;

    /// The canonical value of the identifying property, if set.
    fn identifying_value(&self) -> Option<&str>;

    /// Raw comma-joined alias text, if any.
    fn aliases(&self) -> Option<&str>;

    /// Replace the alias text.
    fn set_aliases(&mut self, aliases: Option<String>);
}

/// Checks that `record` belongs to `M`'s table.
///
/// # Errors
/// - `InvalidRecord`: the table does not match
pub fn expect_table<M: Model>(record: &Record) -> Result<(), StorageError> {
    if record.table == M::TABLE {
        Ok(())
    } else {
        Err(StorageError::InvalidRecord {
            table: M::TABLE.to_string(),
            id: record.id,
            reason: format!("record belongs to table {}", record.table),
        })
    }
}
