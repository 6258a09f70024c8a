//! Locality entities.
//!
//! `Locality`, `City` and `County` are identified by `name`; `State` and
//! `ZipCode` by `short_name` (the postal code). All of them carry the alias
//! field and plug into the dedupe engine through [`Dedupe`].

use std::fmt;

use crate::alias::ALIASES_FIELD;
use crate::model::{expect_table, Dedupe, Model};
use crate::record::{FieldValue, Record, RecordId};
use crate::storage::StorageError;

fn required_text(record: &Record, table: &str, field: &str) -> Result<String, StorageError> {
    record
        .text_owned(field)
        .ok_or_else(|| StorageError::InvalidRecord {
            table: table.to_string(),
            id: record.id,
            reason: format!("missing text field '{field}'"),
        })
}

/// A generic named place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locality {
    /// Stable identity.
    pub id: RecordId,
    /// Canonical name.
    pub name: String,
    /// Abbreviation, if any.
    pub short_name: Option<String>,
    /// Comma-joined alternate spellings of `name`.
    pub aliases: Option<String>,
}

impl Locality {
    /// Creates an unsaved locality.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            short_name: None,
            aliases: None,
        }
    }
}

impl Model for Locality {
    const TABLE: &'static str = "locality";

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", self.name.as_str())
            .with("short_name", FieldValue::text_opt(self.short_name.as_deref()))
            .with(ALIASES_FIELD, FieldValue::text_opt(self.aliases.as_deref()))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: required_text(record, Self::TABLE, "name")?,
            short_name: record.text_owned("short_name"),
            aliases: record.text_owned(ALIASES_FIELD),
        })
    }
}

impl Dedupe for Locality {
    const IDENTIFYING_PROPERTY: &'static str = "name";

    fn identifying_value(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn aliases(&self) -> Option<&str> {
        self.aliases.as_deref()
    }

    fn set_aliases(&mut self, aliases: Option<String>) {
        self.aliases = aliases;
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A city, optionally placed in a county and a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct City {
    /// Stable identity.
    pub id: RecordId,
    /// Canonical name.
    pub name: String,
    /// Abbreviation, if any.
    pub short_name: Option<String>,
    /// Comma-joined alternate spellings of `name`.
    pub aliases: Option<String>,
    /// Census FIPS place code.
    pub fips_id: Option<i64>,
    /// Containing county.
    pub county: Option<RecordId>,
    /// Containing state.
    pub state: Option<RecordId>,
}

impl City {
    /// Creates an unsaved city.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            short_name: None,
            aliases: None,
            fips_id: None,
            county: None,
            state: None,
        }
    }

    /// Places the city in `state`.
    #[must_use]
    pub fn in_state(mut self, state: RecordId) -> Self {
        self.state = Some(state);
        self
    }

    /// Places the city in `county`.
    #[must_use]
    pub fn in_county(mut self, county: RecordId) -> Self {
        self.county = Some(county);
        self
    }
}

impl Model for City {
    const TABLE: &'static str = "city";

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", self.name.as_str())
            .with("short_name", FieldValue::text_opt(self.short_name.as_deref()))
            .with(ALIASES_FIELD, FieldValue::text_opt(self.aliases.as_deref()))
            .with("fips_id", FieldValue::int_opt(self.fips_id))
            .with("county", FieldValue::ref_opt(self.county))
            .with("state", FieldValue::ref_opt(self.state))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: required_text(record, Self::TABLE, "name")?,
            short_name: record.text_owned("short_name"),
            aliases: record.text_owned(ALIASES_FIELD),
            fips_id: record.int("fips_id"),
            county: record.reference("county"),
            state: record.reference("state"),
        })
    }
}

impl Dedupe for City {
    const IDENTIFYING_PROPERTY: &'static str = "name";

    fn identifying_value(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn aliases(&self) -> Option<&str> {
        self.aliases.as_deref()
    }

    fn set_aliases(&mut self, aliases: Option<String>) {
        self.aliases = aliases;
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A county within a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct County {
    /// Stable identity.
    pub id: RecordId,
    /// Canonical name.
    pub name: String,
    /// Abbreviation, if any.
    pub short_name: Option<String>,
    /// Comma-joined alternate spellings of `name`.
    pub aliases: Option<String>,
    /// Census FIPS county code.
    pub fips_id: Option<i64>,
    /// Containing state.
    pub state: Option<RecordId>,
}

impl County {
    /// Creates an unsaved county.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            short_name: None,
            aliases: None,
            fips_id: None,
            state: None,
        }
    }

    /// Places the county in `state`.
    #[must_use]
    pub fn in_state(mut self, state: RecordId) -> Self {
        self.state = Some(state);
        self
    }
}

impl Model for County {
    const TABLE: &'static str = "county";

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", self.name.as_str())
            .with("short_name", FieldValue::text_opt(self.short_name.as_deref()))
            .with(ALIASES_FIELD, FieldValue::text_opt(self.aliases.as_deref()))
            .with("fips_id", FieldValue::int_opt(self.fips_id))
            .with("state", FieldValue::ref_opt(self.state))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: required_text(record, Self::TABLE, "name")?,
            short_name: record.text_owned("short_name"),
            aliases: record.text_owned(ALIASES_FIELD),
            fips_id: record.int("fips_id"),
            state: record.reference("state"),
        })
    }
}

impl Dedupe for County {
    const IDENTIFYING_PROPERTY: &'static str = "name";

    fn identifying_value(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn aliases(&self) -> Option<&str> {
        self.aliases.as_deref()
    }

    fn set_aliases(&mut self, aliases: Option<String>) {
        self.aliases = aliases;
    }
}

impl fmt::Display for County {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A state, keyed by its postal abbreviation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// Stable identity.
    pub id: RecordId,
    /// Full name, e.g. "California".
    pub name: Option<String>,
    /// Postal abbreviation, e.g. "CA".
    pub short_name: String,
    /// Comma-joined alternate spellings of `short_name`.
    pub aliases: Option<String>,
    /// Census FIPS state code.
    pub fips_id: Option<i64>,
}

impl State {
    /// Creates an unsaved state.
    #[must_use]
    pub fn new(short_name: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: None,
            short_name: short_name.into(),
            aliases: None,
            fips_id: None,
        }
    }

    /// Sets the full name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Model for State {
    const TABLE: &'static str = "state";

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", FieldValue::text_opt(self.name.as_deref()))
            .with("short_name", self.short_name.as_str())
            .with(ALIASES_FIELD, FieldValue::text_opt(self.aliases.as_deref()))
            .with("fips_id", FieldValue::int_opt(self.fips_id))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: record.text_owned("name"),
            short_name: required_text(record, Self::TABLE, "short_name")?,
            aliases: record.text_owned(ALIASES_FIELD),
            fips_id: record.int("fips_id"),
        })
    }
}

impl Dedupe for State {
    const IDENTIFYING_PROPERTY: &'static str = "short_name";

    fn identifying_value(&self) -> Option<&str> {
        Some(&self.short_name)
    }

    fn aliases(&self) -> Option<&str> {
        self.aliases.as_deref()
    }

    fn set_aliases(&mut self, aliases: Option<String>) {
        self.aliases = aliases;
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name)
    }
}

/// A ZIP code mapped onto its city, county and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCode {
    /// Stable identity.
    pub id: RecordId,
    /// Metro name, if known.
    pub name: Option<String>,
    /// The five-digit code.
    pub short_name: String,
    /// Comma-joined alternate spellings of `short_name`.
    pub aliases: Option<String>,
    /// City the code belongs to.
    pub city: Option<RecordId>,
    /// County the code belongs to.
    pub county: Option<RecordId>,
    /// State the code belongs to.
    pub state: Option<RecordId>,
}

impl ZipCode {
    /// Creates an unsaved ZIP code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            name: None,
            short_name: code.into(),
            aliases: None,
            city: None,
            county: None,
            state: None,
        }
    }
}

impl Model for ZipCode {
    const TABLE: &'static str = "zip_code";

    fn id(&self) -> RecordId {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", FieldValue::text_opt(self.name.as_deref()))
            .with("short_name", self.short_name.as_str())
            .with(ALIASES_FIELD, FieldValue::text_opt(self.aliases.as_deref()))
            .with("city", FieldValue::ref_opt(self.city))
            .with("county", FieldValue::ref_opt(self.county))
            .with("state", FieldValue::ref_opt(self.state))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: record.text_owned("name"),
            short_name: required_text(record, Self::TABLE, "short_name")?,
            aliases: record.text_owned(ALIASES_FIELD),
            city: record.reference("city"),
            county: record.reference("county"),
            state: record.reference("state"),
        })
    }
}

impl Dedupe for ZipCode {
    const IDENTIFYING_PROPERTY: &'static str = "short_name";

    fn identifying_value(&self) -> Option<&str> {
        Some(&self.short_name)
    }

    fn aliases(&self) -> Option<&str> {
        self.aliases.as_deref()
    }

    fn set_aliases(&mut self, aliases: Option<String>) {
        self.aliases = aliases;
    }
}

impl fmt::Display for ZipCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name)
    }
}
