//! In-memory store for tests and single-process deployments.
//!
//! Each item row, together with its slice of the reservation log, sits
//! behind its own `Mutex`, so sales and restocks of the same item serialize
//! while different items never contend. The outer `RwLock` is only taken for
//! writing when a row is created.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use quitute_core::{CustomerEmail, DomainError, Entity, ItemId};
use quitute_inventory::{InterestKey, InterestRecord, Item, Reservation, RestockEntry};

use super::{
    InterestRegistry, NotificationClaim, ReservationLog, RestockWrite, SaleReceipt, SaleRequest,
    StockLedger, StoreError, StoreResult, SubscriptionDirectory,
};
use crate::messaging::SubscriptionHandle;

#[derive(Debug)]
struct ItemRow {
    item: Item,
    reservations: Vec<Reservation>,
}

type Row = Arc<Mutex<ItemRow>>;

fn new_row(item: Item) -> Row {
    Arc::new(Mutex::new(ItemRow {
        item,
        reservations: Vec::new(),
    }))
}

#[derive(Debug)]
struct InterestRow {
    record: InterestRecord,
    /// Token and expiry of the dispatcher run currently sending to this record.
    claim: Option<(Uuid, DateTime<Utc>)>,
}

impl InterestRow {
    fn claimed_at(&self, now: DateTime<Utc>) -> bool {
        self.claim.is_some_and(|(_, until)| until > now)
    }

    fn release(&mut self, token: Uuid) {
        if self.claim.is_some_and(|(held, _)| held == token) {
            self.claim = None;
        }
    }
}

#[derive(Debug, Clone)]
struct SubscriptionRow {
    #[allow(dead_code)]
    handle: SubscriptionHandle,
    subscribed: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<ItemId, Row>>,
    interests: Mutex<HashMap<InterestKey, InterestRow>>,
    subscriptions: Mutex<HashMap<CustomerEmail, SubscriptionRow>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, item_id: ItemId) -> StoreResult<Option<Row>> {
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.get(&item_id).cloned())
    }

    fn lock(row: &Row) -> StoreResult<MutexGuard<'_, ItemRow>> {
        row.lock().map_err(poisoned)
    }

    fn restock_existing(row: &Row, quantity: i64) -> StoreResult<RestockWrite> {
        let mut row = Self::lock(row)?;
        let change = row.item.restock(quantity)?;
        Ok(RestockWrite {
            item: row.item.clone(),
            inserted: false,
            transitioned: change.became_available(),
        })
    }

    fn key(customer_email: &CustomerEmail, item_id: ItemId) -> InterestKey {
        InterestKey {
            customer_email: customer_email.clone(),
            item_id,
        }
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn get_item(&self, item_id: ItemId) -> StoreResult<Option<Item>> {
        let Some(row) = self.row(item_id)? else {
            return Ok(None);
        };
        let item = Self::lock(&row)?.item.clone();
        Ok(Some(item))
    }

    async fn list_items(&self) -> StoreResult<Vec<Item>> {
        let rows: Vec<Row> = self.items.read().map_err(poisoned)?.values().cloned().collect();
        let mut items = rows
            .iter()
            .map(|row| Self::lock(row).map(|row| row.item.clone()))
            .collect::<StoreResult<Vec<_>>>()?;
        items.sort_by_key(|item| *item.id());
        Ok(items)
    }

    async fn sell(&self, request: SaleRequest) -> StoreResult<SaleReceipt> {
        let row = self
            .row(request.item_id)?
            .ok_or(DomainError::NotFound(request.item_id))?;

        // Decrement and append under the same row lock.
        let mut row = Self::lock(&row)?;
        row.item.check_sale(request.quantity)?;
        let reservation = Reservation::confirmed(
            request.item_id,
            request.customer_email,
            request.quantity,
            Utc::now(),
        )?;
        row.item.sell(request.quantity)?;
        row.reservations.push(reservation.clone());

        Ok(SaleReceipt {
            item: row.item.clone(),
            reservation,
        })
    }

    async fn restock(&self, entry: &RestockEntry) -> StoreResult<RestockWrite> {
        if let Some(row) = self.row(entry.item_id)? {
            return Self::restock_existing(&row, entry.quantity);
        }

        let mut items = self.items.write().map_err(poisoned)?;
        let row = match items.entry(entry.item_id) {
            // Created by someone else between the read and the write lock.
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let mut item = Item::new(entry.item_id, entry.name.clone())?;
                item.restock(entry.quantity)?;
                slot.insert(new_row(item.clone()));
                return Ok(RestockWrite {
                    item,
                    inserted: true,
                    transitioned: false,
                });
            }
        };
        drop(items);

        Self::restock_existing(&row, entry.quantity)
    }

    async fn seed(&self, item: Item) -> StoreResult<bool> {
        let mut items = self.items.write().map_err(poisoned)?;
        match items.entry(*item.id()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(new_row(item));
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl InterestRegistry for InMemoryStore {
    async fn register_interest(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        desired_quantity: Option<i64>,
    ) -> StoreResult<InterestRecord> {
        if self.row(item_id)?.is_none() {
            return Err(DomainError::NotFound(item_id).into());
        }

        let mut interests = self.interests.lock().map_err(poisoned)?;
        match interests.entry(Self::key(customer_email, item_id)) {
            Entry::Occupied(mut existing) => {
                let row = existing.get_mut();
                row.record.rearm(desired_quantity)?;
                Ok(row.record.clone())
            }
            Entry::Vacant(slot) => {
                let record = InterestRecord::new(
                    customer_email.clone(),
                    item_id,
                    desired_quantity,
                    Utc::now(),
                )?;
                let row = slot.insert(InterestRow {
                    record,
                    claim: None,
                });
                Ok(row.record.clone())
            }
        }
    }

    async fn interests_for_item(&self, item_id: ItemId) -> StoreResult<Vec<InterestRecord>> {
        let interests = self.interests.lock().map_err(poisoned)?;
        let mut records: Vec<InterestRecord> = interests
            .values()
            .filter(|r| r.record.item_id == item_id)
            .map(|r| r.record.clone())
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.customer_email.cmp(&b.customer_email))
        });
        Ok(records)
    }

    async fn claim_pending(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        lease: Duration,
    ) -> StoreResult<Option<NotificationClaim>> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| DomainError::Validation(format!("claim lease out of range: {e}")))?;
        let now = Utc::now();

        let mut interests = self.interests.lock().map_err(poisoned)?;
        let Some(row) = interests.get_mut(&Self::key(customer_email, item_id)) else {
            return Ok(None);
        };
        if !row.record.is_pending() || row.claimed_at(now) {
            return Ok(None);
        }

        let token = Uuid::now_v7();
        let expires_at = now + lease;
        row.claim = Some((token, expires_at));
        Ok(Some(NotificationClaim {
            record: row.record.clone(),
            token,
            expires_at,
        }))
    }

    async fn mark_notified(&self, claim: &NotificationClaim) -> StoreResult<bool> {
        let key = claim.record.key();
        let mut interests = self.interests.lock().map_err(poisoned)?;
        let Some(row) = interests.get_mut(&key) else {
            return Ok(false);
        };
        let marked = row.record.mark_notified(claim.record.revision);
        row.release(claim.token);
        Ok(marked)
    }

    async fn release_claim(&self, claim: &NotificationClaim) -> StoreResult<()> {
        let key = claim.record.key();
        let mut interests = self.interests.lock().map_err(poisoned)?;
        if let Some(row) = interests.get_mut(&key) {
            row.release(claim.token);
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationLog for InMemoryStore {
    async fn reservations_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Reservation>> {
        let Some(row) = self.row(item_id)? else {
            return Ok(Vec::new());
        };
        let reservations = Self::lock(&row)?.reservations.clone();
        Ok(reservations)
    }
}

#[async_trait]
impl SubscriptionDirectory for InMemoryStore {
    async fn record_subscription(
        &self,
        customer_email: &CustomerEmail,
        handle: &SubscriptionHandle,
    ) -> StoreResult<()> {
        let mut subs = self.subscriptions.lock().map_err(poisoned)?;
        subs.insert(
            customer_email.clone(),
            SubscriptionRow {
                handle: handle.clone(),
                subscribed: true,
            },
        );
        Ok(())
    }

    async fn is_subscribed(&self, customer_email: &CustomerEmail) -> StoreResult<bool> {
        let subs = self.subscriptions.lock().map_err(poisoned)?;
        Ok(subs.get(customer_email).is_some_and(|s| s.subscribed))
    }
}
