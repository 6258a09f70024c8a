//! Record filters.
//!
//! A [`Lookup`] is a conjunction of [`Filter`]s, the equivalent of the keyword
//! arguments a caller hands to `get` / `get_or_create` (`state=…`,
//! `name__iexact=…`). The store evaluates lookups with [`Lookup::matches`];
//! the alias registry inspects them to refuse query shapes it cannot support.

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record};

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact equality (text, int, reference or null).
    Exact,
    /// Case-insensitive text equality.
    IExact,
    /// Text contains the value.
    Contains,
    /// Text starts with the value.
    StartsWith,
    /// Text ends with the value.
    EndsWith,
    /// Field is null (the filter value is ignored).
    IsNull,
}

impl FilterOp {
    /// Returns true for operators that compare a derived or partial form of
    /// the field rather than the stored value itself.
    #[must_use]
    pub const fn is_partial(self) -> bool {
        !matches!(self, Self::Exact)
    }
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Field name.
    pub field: String,
    /// Comparison.
    pub op: FilterOp,
    /// Operand.
    pub value: FieldValue,
}

impl Filter {
    /// Evaluates this filter against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field);
        match self.op {
            FilterOp::Exact => actual == &self.value,
            FilterOp::IsNull => actual.is_null(),
            FilterOp::IExact => text_pair(actual, &self.value)
                .is_some_and(|(a, b)| a.to_lowercase() == b.to_lowercase()),
            FilterOp::Contains => text_pair(actual, &self.value).is_some_and(|(a, b)| a.contains(b)),
            FilterOp::StartsWith => {
                text_pair(actual, &self.value).is_some_and(|(a, b)| a.starts_with(b))
            }
            FilterOp::EndsWith => text_pair(actual, &self.value).is_some_and(|(a, b)| a.ends_with(b)),
        }
    }
}

fn text_pair<'a>(actual: &'a FieldValue, operand: &'a FieldValue) -> Option<(&'a str, &'a str)> {
    Some((actual.as_text()?, operand.as_text()?))
}

/// A conjunction of filters. The empty lookup matches every record.
///
/// # Examples
///
/// ```
/// use civic_dedupe::{Lookup, Record, RecordId};
///
/// let state = RecordId::new();
/// let city = Record::new("city", RecordId::new())
///     .with("name", "Alameda")
///     .with("state", state);
///
/// assert!(Lookup::new().eq("state", state).iexact("name", "ALAMEDA").matches(&city));
/// assert!(!Lookup::new().is_null("state").matches(&city));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    filters: Vec<Filter>,
}

impl Lookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an arbitrary filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// `field = value`
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filter(field, FilterOp::Exact, value)
    }

    /// `field` equals `value` ignoring case.
    #[must_use]
    pub fn iexact(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(field, FilterOp::IExact, FieldValue::Text(value.into()))
    }

    /// `field` contains `value`.
    #[must_use]
    pub fn contains(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(field, FilterOp::Contains, FieldValue::Text(value.into()))
    }

    /// `field` starts with `value`.
    #[must_use]
    pub fn starts_with(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(field, FilterOp::StartsWith, FieldValue::Text(value.into()))
    }

    /// `field` ends with `value`.
    #[must_use]
    pub fn ends_with(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(field, FilterOp::EndsWith, FieldValue::Text(value.into()))
    }

    /// `field IS NULL`
    #[must_use]
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.filter(field, FilterOp::IsNull, FieldValue::Null)
    }

    /// Returns the filters in insertion order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns true when no filters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns true if every filter matches.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Returns true if any filter targets `field`.
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.filters.iter().any(|f| f.field == field)
    }

    /// Field values a newly created record inherits from this lookup.
    ///
    /// Only exact and is-null filters pin a value; partial comparisons say
    /// nothing about what the field should hold.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.filters.iter().filter_map(|f| match f.op {
            FilterOp::Exact | FilterOp::IsNull => Some((f.field.as_str(), &f.value)),
            _ => None,
        })
    }
}
