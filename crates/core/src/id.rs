//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Identifier of a catalog item.
///
/// Items are keyed by the stable numeric id assigned at catalog-load time, so
/// suppliers and the storefront agree on it without a lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(i64);

impl ItemId {
    /// Validate a raw identifier (must be positive).
    pub fn try_new(raw: i64) -> DomainResult<Self> {
        if raw <= 0 {
            return Err(DomainError::invalid_id(format!(
                "ItemId: must be positive, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::invalid_id(format!("ItemId: {e}")))?;
        Self::try_new(raw)
    }
}

impl TryFrom<i64> for ItemId {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

/// Identifier of a committed reservation (one per successful sale).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered), so the reservation log sorts by creation.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ReservationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("ReservationId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_rejects_non_positive() {
        assert!(ItemId::try_new(0).is_err());
        assert!(ItemId::try_new(-3).is_err());
        assert_eq!(ItemId::try_new(7).unwrap().get(), 7);
    }

    #[test]
    fn item_id_parses_from_path_segment() {
        let id: ItemId = " 12 ".parse().unwrap();
        assert_eq!(id.get(), 12);
        assert!(matches!("abc".parse::<ItemId>(), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn item_id_is_transparent_in_json() {
        let id = ItemId::try_new(3).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "3");
    }
}
