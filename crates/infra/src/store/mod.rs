//! Data-access contracts for the stock ledger, interest registry,
//! reservation log and subscription directory.
//!
//! Every mutating method is one atomic unit against the backing store:
//! callers never see a half-applied sale or restock. Business rules are not
//! re-implemented here; stores load rows into the `quitute-inventory` types,
//! apply the rule under their lock or transaction, and write the result back.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use quitute_core::{CustomerEmail, DomainError, ItemId};
use quitute_inventory::{InterestRecord, Item, Reservation, RestockEntry};

use crate::messaging::SubscriptionHandle;

/// Store-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient infrastructure fault (connection, pool, timeout, poisoned lock).
    /// Nothing was written; the whole operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A business rule rejected the mutation and the unit was rolled back.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// A row could not be decoded or a schema constraint was violated.
    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A request to sell `quantity` units of `item_id` to `customer_email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRequest {
    pub item_id: ItemId,
    pub customer_email: CustomerEmail,
    pub quantity: i64,
}

/// Result of a committed sale: the item as it was left, and the log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleReceipt {
    pub item: Item,
    pub reservation: Reservation,
}

/// Result of one committed restock entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockWrite {
    pub item: Item,
    /// The row did not exist before this write.
    pub inserted: bool,
    /// An existing row went from unavailable to available.
    pub transitioned: bool,
}

/// A pending interest record reserved by one dispatcher run for one send.
///
/// While the claim is live no other run can claim the same record, so
/// overlapping runs for the same item never message the same customer twice.
/// A claim that is never completed (the run crashed) lapses at `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClaim {
    /// The record as it was when claimed, including the revision the send is for.
    pub record: InterestRecord,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn get_item(&self, item_id: ItemId) -> StoreResult<Option<Item>>;

    async fn list_items(&self) -> StoreResult<Vec<Item>>;

    /// Row-locked check-and-decrement plus reservation append, all or nothing.
    async fn sell(&self, request: SaleRequest) -> StoreResult<SaleReceipt>;

    /// Row-locked increment, creating the item if absent.
    async fn restock(&self, entry: &RestockEntry) -> StoreResult<RestockWrite>;

    /// Insert a catalog item if it does not exist yet. Returns `true` if inserted.
    async fn seed(&self, item: Item) -> StoreResult<bool>;
}

#[async_trait]
pub trait InterestRegistry: Send + Sync {
    /// Insert-or-update keyed by `(customer_email, item_id)`; always re-arms.
    ///
    /// `desired_quantity = None` keeps an existing record's quantity
    /// (or the default of 1 for a new record).
    async fn register_interest(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        desired_quantity: Option<i64>,
    ) -> StoreResult<InterestRecord>;

    async fn interests_for_item(&self, item_id: ItemId) -> StoreResult<Vec<InterestRecord>>;

    /// Reserve a pending record for one send, for at most `lease`.
    ///
    /// `None` if the record is gone, already notified, or held by another
    /// unexpired claim.
    async fn claim_pending(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        lease: Duration,
    ) -> StoreResult<Option<NotificationClaim>>;

    /// Conditional `notified: false → true` for the claimed revision, and
    /// release of the claim. Returns whether this call did the transition;
    /// `false` leaves the record pending (e.g. re-armed during the send).
    async fn mark_notified(&self, claim: &NotificationClaim) -> StoreResult<bool>;

    /// Give a claim back without marking (the send failed).
    async fn release_claim(&self, claim: &NotificationClaim) -> StoreResult<()>;
}

#[async_trait]
pub trait ReservationLog: Send + Sync {
    async fn reservations_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Reservation>>;
}

#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    async fn record_subscription(
        &self,
        customer_email: &CustomerEmail,
        handle: &SubscriptionHandle,
    ) -> StoreResult<()>;

    async fn is_subscribed(&self, customer_email: &CustomerEmail) -> StoreResult<bool>;
}

/// Everything the services need from one backing store.
pub trait InventoryStore: StockLedger + InterestRegistry + ReservationLog + SubscriptionDirectory {}

impl<T> InventoryStore for T where
    T: StockLedger + InterestRegistry + ReservationLog + SubscriptionDirectory + ?Sized
{
}
