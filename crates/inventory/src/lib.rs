//! Inventory domain module.
//!
//! Business rules for the bakery's stock ledger, reservation log and interest
//! registry, implemented as deterministic domain logic (no IO, no HTTP, no
//! storage). Stores load rows into these types, apply one rule under their
//! own lock/transaction, and write the result back.

pub mod catalog;
pub mod events;
pub mod interest;
pub mod item;
pub mod reservation;
pub mod restock;

pub use catalog::{Catalog, CatalogEntry};
pub use events::BackInStock;
pub use interest::{InterestKey, InterestRecord};
pub use item::{Item, StockChange};
pub use reservation::Reservation;
pub use restock::RestockEntry;
