//! Records and record identity.
//!
//! A [`Record`] is the unit the store persists: a table name, an opaque
//! stable [`RecordId`], and a map of named fields. Typed domain structs are
//! converted to and from records through [`crate::model::Model`], which keeps
//! the store free of any knowledge about cities, counties or finance rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, stable record identifier.
///
/// Ids are assigned once at construction and are never reused: a retired id
/// stays reserved for as long as the store lives.
///
/// # Examples
///
/// ```
/// use civic_dedupe::RecordId;
///
/// let id = RecordId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value (SQL `NULL`).
    Null,
    /// Text value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Reference to another record.
    Ref(RecordId),
}

impl FieldValue {
    /// Text value, or `Null` when `value` is `None`.
    #[must_use]
    pub fn text_opt(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.to_string()))
    }

    /// Reference value, or `Null` when `id` is `None`.
    #[must_use]
    pub fn ref_opt(id: Option<RecordId>) -> Self {
        id.map_or(Self::Null, Self::Ref)
    }

    /// Integer value, or `Null` when `value` is `None`.
    #[must_use]
    pub fn int_opt(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }

    /// Returns true for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced id, if this is a reference.
    #[must_use]
    pub const fn as_ref_id(&self) -> Option<RecordId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<RecordId> for FieldValue {
    fn from(id: RecordId) -> Self {
        Self::Ref(id)
    }
}

/// A stored row.
///
/// `version`, `sequence`, `created_at` and `updated_at` are owned by the
/// store: whatever the caller puts there is overwritten on insert/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity.
    pub id: RecordId,

    /// Table (record type) name.
    pub table: String,

    /// Named fields. Missing fields read as `Null`.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,

    /// Version number, 1 on insert, incremented by every update.
    pub version: u64,

    /// Insertion order within the store; used for stable result ordering.
    pub sequence: u64,

    /// When the record was first stored.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Creates an unsaved record with no fields.
    #[must_use]
    pub fn new(table: impl Into<String>, id: RecordId) -> Self {
        let now = Utc::now();
        Self {
            id,
            table: table.into(),
            fields: BTreeMap::new(),
            version: 0,
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Reads a field; missing fields are `Null`.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&FieldValue::Null)
    }

    /// Text field, `None` when null or not text.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_text()
    }

    /// Owned text field.
    #[must_use]
    pub fn text_owned(&self, field: &str) -> Option<String> {
        self.text(field).map(str::to_string)
    }

    /// Integer field.
    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        match self.get(field) {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Reference field.
    #[must_use]
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        self.get(field).as_ref_id()
    }

    /// Iterates over every `(field, target)` reference this record holds.
    pub fn references(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_ref_id().map(|id| (name.as_str(), id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_creation() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_nil());
    }

    #[test]
    fn test_record_id_display() {
        let id = RecordId::new();
        let display = format!("{id}");
        assert!(display.contains('-')); // UUID format
    }

    #[test]
    fn test_missing_fields_read_as_null() {
        let record = Record::new("city", RecordId::new()).with("name", "Alameda");
        assert_eq!(record.text("name"), Some("Alameda"));
        assert!(record.get("aliases").is_null());
        assert_eq!(record.text("aliases"), None);
        assert_eq!(record.reference("state"), None);
    }

    #[test]
    fn test_references_lists_only_ref_fields() {
        let state = RecordId::new();
        let county = RecordId::new();
        let record = Record::new("city", RecordId::new())
            .with("name", "Alameda")
            .with("state", state)
            .with("county", county)
            .with("fips_id", 600_562_i64);

        let mut refs: Vec<_> = record.references().collect();
        refs.sort();
        assert_eq!(refs, vec![("county", county), ("state", state)]);
    }

    #[test]
    fn test_field_value_serde_is_tagged() {
        let json = serde_json::to_value(FieldValue::Text("CA".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "value": "CA"}));

        let null = serde_json::to_value(FieldValue::Null).unwrap();
        assert_eq!(null, serde_json::json!({"type": "null"}));

        let back: FieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, FieldValue::Text("CA".to_string()));
    }
}
