use axum::extract::Path;
use axum::extract::rejection::PathRejection;
use serde::{Deserialize, Serialize};

use quitute_core::{CustomerEmail, ItemId};
use quitute_infra::services::RestockSummary;
use quitute_inventory::{Item, RestockEntry};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub item_id: i64,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SaleRequest {
    pub item_id: i64,
    pub quantity: Option<i64>,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RestockLine {
    pub item_id: i64,
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    pub num_items: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    pub item_id: i64,
    pub email: String,
    pub desired_quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub email: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub name: String,
    pub stock_quantity: i64,
    pub available: bool,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id_typed(),
            name: item.name().to_string(),
            stock_quantity: item.stock_quantity(),
            available: item.available(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationView {
    pub entries: Vec<RestockEntry>,
    #[serde(flatten)]
    pub summary: RestockSummary,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_item_id(raw: i64) -> Result<ItemId, axum::response::Response> {
    ItemId::try_new(raw).map_err(errors::invalid_input)
}

/// `{item_id}` path segment: non-numeric and non-positive ids are both 400s.
pub fn path_item_id(
    path: Result<Path<i64>, PathRejection>,
) -> Result<ItemId, axum::response::Response> {
    let Path(raw) = path.map_err(errors::path_rejection)?;
    parse_item_id(raw)
}

pub fn parse_email(raw: &str) -> Result<CustomerEmail, axum::response::Response> {
    CustomerEmail::parse(raw).map_err(errors::invalid_input)
}

pub fn parse_restock_lines(
    lines: Vec<RestockLine>,
) -> Result<Vec<RestockEntry>, axum::response::Response> {
    lines
        .into_iter()
        .map(|line| {
            let item_id = parse_item_id(line.item_id)?;
            RestockEntry::new(item_id, line.name, line.quantity).map_err(errors::invalid_input)
        })
        .collect()
}
