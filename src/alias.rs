//! Alias lists.
//!
//! Aliases are persisted as a single comma-joined text field (the shape the
//! interchange files use), or as null when there are none. [`AliasSet`] is the
//! parsed form: trimmed, de-duplicated, insertion-ordered.

use std::fmt;

/// Separator used in the serialized alias text.
pub const ALIAS_SEPARATOR: char = ',';

/// Name of the alias field on every dedupable record.
pub const ALIASES_FIELD: &str = "aliases";

/// An ordered set of alias spellings.
///
/// Comparison is exact: `"Alameda"` and `"ALAMEDA"` are distinct aliases,
/// because exact-match lookups must be able to resolve either spelling.
///
/// # Examples
///
/// ```
/// use civic_dedupe::AliasSet;
///
/// let set = AliasSet::parse(" my_alias, your_alias ,my_alias,, ");
/// assert_eq!(set.to_text().as_deref(), Some("my_alias,your_alias"));
/// assert_eq!(AliasSet::parse(" , ").to_text(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasSet {
    items: Vec<String>,
}

impl AliasSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses comma-joined alias text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut set = Self::new();
        set.extend(text.split(ALIAS_SEPARATOR));
        set
    }

    /// Parses an optional alias field; `None` yields the empty set.
    #[must_use]
    pub fn from_field(text: Option<&str>) -> Self {
        text.map_or_else(Self::new, Self::parse)
    }

    /// Inserts an alias after trimming it. Blank and duplicate spellings are
    /// ignored. Returns true if the set changed.
    pub fn insert(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        if alias.is_empty() || self.contains(alias) {
            return false;
        }
        self.items.push(alias.to_string());
        true
    }

    /// Inserts every alias from the iterator.
    pub fn extend<'a>(&mut self, aliases: impl IntoIterator<Item = &'a str>) {
        for alias in aliases {
            self.insert(alias);
        }
    }

    /// Removes an alias. Returns true if it was present.
    pub fn remove(&mut self, alias: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a != alias);
        self.items.len() != before
    }

    /// Exact membership test (after trimming the candidate).
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        let alias = alias.trim();
        self.items.iter().any(|a| a == alias)
    }

    /// Number of aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no aliases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Serializes to comma-joined text; the empty set is `None`, never `""`.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        if self.items.is_empty() {
            None
        } else {
            let mut buf = [0u8; 4];
            Some(self.items.join(&*ALIAS_SEPARATOR.encode_utf8(&mut buf)))
        }
    }
}

impl fmt::Display for AliasSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text().unwrap_or_default())
    }
}

impl<'a> FromIterator<&'a str> for AliasSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Normalizes an alias field.
///
/// Splits on the separator, trims, de-duplicates, and drops `own_value` (an
/// entity is never its own alias). Blank results become `None`.
#[must_use]
pub fn normalize_aliases(text: Option<&str>, own_value: Option<&str>) -> Option<String> {
    let mut set = AliasSet::from_field(text);
    if let Some(own) = own_value {
        set.remove(own.trim());
    }
    set.to_text()
}
