use serde::{Deserialize, Serialize};

use quitute_core::{DomainResult, ItemId};

use crate::item::{ensure_positive_quantity, validate_name};

/// One line of a supplier delivery: add `quantity` units of `item_id`,
/// creating the item (with `name`) if the catalog does not know it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockEntry {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: i64,
}

impl RestockEntry {
    pub fn new(item_id: ItemId, name: impl Into<String>, quantity: i64) -> DomainResult<Self> {
        let name = validate_name(name.into())?;
        ensure_positive_quantity(quantity)?;
        Ok(Self {
            item_id,
            name,
            quantity,
        })
    }

    /// Re-check an entry that arrived through deserialization.
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(self.name.clone())?;
        ensure_positive_quantity(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_name_and_quantity() {
        let id = ItemId::try_new(4).unwrap();
        assert!(RestockEntry::new(id, "brioche", 4).is_ok());
        assert!(RestockEntry::new(id, "", 4).is_err());
        assert!(RestockEntry::new(id, "brioche", 0).is_err());
    }

    #[test]
    fn validate_catches_deserialized_garbage() {
        let entry: RestockEntry =
            serde_json::from_str(r#"{"item_id": 4, "name": "brioche", "quantity": -2}"#).unwrap();
        assert!(entry.validate().is_err());
    }
}
