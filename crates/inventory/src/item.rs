use serde::{Deserialize, Serialize};

use quitute_core::{DomainError, DomainResult, Entity, ItemId};

const MAX_NAME_LEN: usize = 200;

/// A row of the stock ledger: one sellable bakery item.
///
/// `available` is persisted for fast filtering but is never set directly:
/// every mutation goes through [`Item::set_stock`], which derives it from
/// `stock_quantity`. After any successful mutation
/// `available == (stock_quantity > 0)` holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    stock_quantity: i64,
    available: bool,
}

/// Before/after view of one stock mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub item_id: ItemId,
    pub before: i64,
    pub after: i64,
    pub was_available: bool,
    pub is_available: bool,
}

impl StockChange {
    /// The unavailable → available transition that qualifies for restock
    /// notification. Top-ups of an already available item do not count.
    pub fn became_available(&self) -> bool {
        !self.was_available && self.is_available
    }

    pub fn became_unavailable(&self) -> bool {
        self.was_available && !self.is_available
    }
}

impl Item {
    /// A freshly catalogued item with no stock.
    pub fn new(id: ItemId, name: impl Into<String>) -> DomainResult<Self> {
        let name = validate_name(name.into())?;
        Ok(Self {
            id,
            name,
            stock_quantity: 0,
            available: false,
        })
    }

    /// Rehydrate an item from persisted fields.
    ///
    /// Rejects rows that break the stock invariants instead of silently fixing
    /// them, so a corrupted row is noticed rather than sold from.
    pub fn from_parts(
        id: ItemId,
        name: impl Into<String>,
        stock_quantity: i64,
        available: bool,
    ) -> DomainResult<Self> {
        if stock_quantity < 0 {
            return Err(DomainError::invariant(format!(
                "item {id} has negative stock ({stock_quantity})"
            )));
        }
        if available != (stock_quantity > 0) {
            return Err(DomainError::invariant(format!(
                "item {id} availability flag ({available}) disagrees with stock ({stock_quantity})"
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            stock_quantity,
            available,
        })
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    /// Persisted availability flag.
    pub fn available(&self) -> bool {
        self.available
    }

    /// Whether a customer can walk in and get one right now.
    pub fn is_available(&self) -> bool {
        self.available && self.stock_quantity > 0
    }

    /// Decide whether `quantity` units can be sold, without mutating.
    pub fn check_sale(&self, quantity: i64) -> DomainResult<()> {
        ensure_positive_quantity(quantity)?;

        if !self.available || self.stock_quantity == 0 {
            return Err(DomainError::OutOfStock { item_id: self.id });
        }
        if self.stock_quantity < quantity {
            return Err(DomainError::InsufficientStock {
                item_id: self.id,
                requested: quantity,
                on_hand: self.stock_quantity,
            });
        }
        Ok(())
    }

    /// Take `quantity` units out of stock.
    ///
    /// On error the item is left untouched.
    pub fn sell(&mut self, quantity: i64) -> DomainResult<StockChange> {
        self.check_sale(quantity)?;
        let after = self.stock_quantity - quantity;
        Ok(self.set_stock(after))
    }

    /// Add `quantity` units to stock.
    pub fn restock(&mut self, quantity: i64) -> DomainResult<StockChange> {
        ensure_positive_quantity(quantity)?;
        let after = self.stock_quantity.checked_add(quantity).ok_or_else(|| {
            DomainError::invariant(format!("stock overflow for item {}", self.id))
        })?;
        Ok(self.set_stock(after))
    }

    /// The single place where `available` is derived.
    fn set_stock(&mut self, after: i64) -> StockChange {
        let change = StockChange {
            item_id: self.id,
            before: self.stock_quantity,
            after,
            was_available: self.is_available(),
            is_available: after > 0,
        };
        self.stock_quantity = after;
        self.available = after > 0;
        change
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

pub(crate) fn validate_name(name: String) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn ensure_positive_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "quantity must be greater than 0 (got {quantity})"
        )));
    }
    Ok(())
}
