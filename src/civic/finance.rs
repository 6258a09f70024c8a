//! Finance records that reference localities.
//!
//! A benefactor's address points at a city, a state and a ZIP code. These
//! references are what a locality merge has to re-point.

use crate::model::{expect_table, Model};
use crate::record::{FieldValue, Record, RecordId};
use crate::storage::StorageError;

/// Postal address; the locality parts are references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Street line.
    pub street: Option<String>,
    /// City reference.
    pub city: Option<RecordId>,
    /// State reference.
    pub state: Option<RecordId>,
    /// ZIP code reference.
    pub zip_code: Option<RecordId>,
}

/// A person or organization giving money to a committee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benefactor {
    /// Stable identity.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Where the benefactor lives or is registered.
    pub address: Address,
}

impl Benefactor {
    /// Creates an unsaved benefactor.
    #[must_use]
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            address,
        }
    }
}

impl Model for Benefactor {
    const TABLE: &'static str = "benefactor";

    fn id(&self) -> RecordId {
        self.id
    }

    // The address is flattened into the benefactor row.
    fn to_record(&self) -> Record {
        Record::new(Self::TABLE, self.id)
            .with("name", self.name.as_str())
            .with("street", FieldValue::text_opt(self.address.street.as_deref()))
            .with("city", FieldValue::ref_opt(self.address.city))
            .with("state", FieldValue::ref_opt(self.address.state))
            .with("zip_code", FieldValue::ref_opt(self.address.zip_code))
    }

    fn from_record(record: &Record) -> Result<Self, StorageError> {
        expect_table::<Self>(record)?;
        Ok(Self {
            id: record.id,
            name: record.text_owned("name").unwrap_or_default(),
            address: Address {
                street: record.text_owned("street"),
                city: record.reference("city"),
                state: record.reference("state"),
                zip_code: record.reference("zip_code"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_flattened() {
        let city = RecordId::new();
        let benefactor = Benefactor::new(
            "Friends of the Library",
            Address {
                street: Some("1 Main St".to_string()),
                city: Some(city),
                ..Address::default()
            },
        );
        let record = benefactor.to_record();
        assert_eq!(record.reference("city"), Some(city));
        assert!(record.get("zip_code").is_null());
        assert_eq!(Benefactor::from_record(&record).unwrap(), benefactor);
    }
}
