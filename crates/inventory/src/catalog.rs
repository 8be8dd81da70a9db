//! The bakery's standard catalog.
//!
//! Used to seed the stock ledger at startup and by the supplier simulator to
//! pick what a delivery contains.

use serde::{Deserialize, Serialize};

use quitute_core::{DomainResult, ItemId};

use crate::restock::RestockEntry;

/// One catalogued product with the quantity of a standard delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    pub name: String,
    pub standard_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

const BAKERY: &[(i64, &str, i64)] = &[
    (1, "pão francês", 8),
    (2, "croissant", 5),
    (3, "pão careca", 7),
    (4, "brioche", 4),
    (5, "pão de queijo", 9),
    (6, "joelho", 6),
    (7, "coxinha", 8),
    (8, "sonho", 5),
    (9, "bolo de chocolate", 3),
    (10, "bolo de cenoura", 4),
    (11, "torta de limão", 2),
    (12, "cookie de chocolate", 9),
    (13, "brigadeiro gigante", 3),
    (14, "cheesecake", 2),
    (15, "muffin quentinho", 7),
    (16, "empada", 6),
    (17, "quiche", 3),
    (18, "pão doce", 8),
    (19, "torta de maçã", 4),
    (20, "brownie", 6),
];

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// The twenty products the bakery sells.
    pub fn bakery() -> Self {
        let entries = BAKERY
            .iter()
            .filter_map(|&(id, name, qty)| {
                ItemId::try_new(id).ok().map(|item_id| CatalogEntry {
                    item_id,
                    name: name.to_string(),
                    standard_quantity: qty,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, item_id: ItemId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.item_id == item_id)
    }

    /// A full delivery: every product at its standard quantity.
    pub fn standard_delivery(&self) -> DomainResult<Vec<RestockEntry>> {
        self.entries
            .iter()
            .map(|e| RestockEntry::new(e.item_id, e.name.clone(), e.standard_quantity))
            .collect()
    }
}
