use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use quitute_core::ItemId;
use quitute_events::{BusError, EventBus, EventEnvelope};
use quitute_inventory::{BackInStock, Item, RestockEntry};

use crate::error::ServiceError;
use crate::store::{StockLedger, StoreError};

/// The bus restock publishes "notify interested parties for item X" on.
pub type TriggerBus = dyn EventBus<EventEnvelope<JsonValue>, Error = BusError>;

/// One entry that could not be committed. Other entries are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockFailure {
    pub item_id: ItemId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockSummary {
    /// Entries that created a new item row.
    pub inserted: usize,
    /// Entries that incremented an existing row.
    pub updated: usize,
    /// Items that went unavailable → available and had a trigger enqueued.
    pub notified_items: Vec<ItemId>,
    /// Items that transitioned but whose trigger could not be enqueued.
    /// Their stock stays committed; re-run the dispatcher for them by hand.
    pub trigger_failures: Vec<ItemId>,
    pub failed: Vec<RestockFailure>,
}

/// Increments stock entry by entry, detects availability transitions and
/// enqueues one dispatcher trigger per transitioned item.
pub struct RestockService<S: ?Sized> {
    store: Arc<S>,
    bus: Arc<TriggerBus>,
}

impl<S> RestockService<S>
where
    S: StockLedger + ?Sized,
{
    pub fn new(store: Arc<S>, bus: Arc<TriggerBus>) -> Self {
        Self { store, bus }
    }

    /// Apply every entry in its own transaction, then enqueue triggers.
    ///
    /// Input is validated up front: one bad entry rejects the whole call
    /// before anything is written. After that, a store failure on one entry
    /// is reported in `failed` and does not stop the rest. If nothing at all
    /// could be written because the store is down, the call fails with
    /// `StoreUnavailable` and is safe to retry.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn restock(&self, entries: Vec<RestockEntry>) -> Result<RestockSummary, ServiceError> {
        if entries.is_empty() {
            return Err(ServiceError::Validation(
                "restock requires at least one entry".to_string(),
            ));
        }
        for entry in &entries {
            entry.validate().map_err(|e| {
                ServiceError::Validation(format!("entry for item {}: {}", entry.item_id, e))
            })?;
        }

        let mut summary = RestockSummary::default();
        let mut transitioned: Vec<Item> = Vec::new();
        let mut last_unavailable = None;

        // Sequential, so duplicate ids in one list apply one after another.
        for entry in &entries {
            match self.store.restock(entry).await {
                Ok(write) => {
                    if write.inserted {
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                    info!(
                        item_id = %entry.item_id,
                        quantity = entry.quantity,
                        stock_quantity = write.item.stock_quantity(),
                        inserted = write.inserted,
                        "restock entry applied"
                    );
                    if write.transitioned {
                        info!(item_id = %entry.item_id, "item back in stock");
                        transitioned.push(write.item);
                    }
                }
                Err(err) => {
                    warn!(item_id = %entry.item_id, error = %err, "restock entry failed");
                    if let StoreError::Unavailable(msg) = &err {
                        last_unavailable = Some(msg.clone());
                    }
                    summary.failed.push(RestockFailure {
                        item_id: entry.item_id,
                        error: ServiceError::from(err).to_string(),
                    });
                }
            }
        }

        if summary.inserted + summary.updated == 0 {
            if let Some(msg) = last_unavailable {
                if summary.failed.len() == entries.len() {
                    return Err(ServiceError::StoreUnavailable(msg));
                }
            }
        }

        // Triggers go out only after every entry has been committed.
        for item in transitioned {
            if summary.notified_items.contains(&item.id_typed()) {
                continue;
            }
            match self.enqueue_trigger(&item) {
                Ok(()) => summary.notified_items.push(item.id_typed()),
                Err(err) => {
                    error!(
                        item_id = %item.id_typed(),
                        error = %err,
                        "could not enqueue back-in-stock trigger"
                    );
                    summary.trigger_failures.push(item.id_typed());
                }
            }
        }

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            notified = summary.notified_items.len(),
            failed = summary.failed.len(),
            "restock finished"
        );
        Ok(summary)
    }

    /// Publish the trigger, retrying exactly once.
    fn enqueue_trigger(&self, item: &Item) -> Result<(), BusError> {
        let event = BackInStock {
            item_id: item.id_typed(),
            item_name: item.name().to_string(),
            stock_quantity: item.stock_quantity(),
            occurred_at: Utc::now(),
        };
        let envelope =
            EventEnvelope::from_typed(&event).map_err(|e| BusError::Serialize(e.to_string()))?;

        match self.bus.publish(envelope.clone()) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(item_id = %item.id_typed(), error = %first, "trigger publish failed, retrying once");
                self.bus.publish(envelope)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use quitute_events::{InMemoryEventBus, Subscription};

    use crate::services::testing::{id, store_with};

    fn bus() -> Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> {
        Arc::new(InMemoryEventBus::new())
    }

    fn entry(item: i64, quantity: i64) -> RestockEntry {
        RestockEntry::new(id(item), "coxinha", quantity).unwrap()
    }

    fn drain(sub: &Subscription<EventEnvelope<JsonValue>>) -> Vec<ItemId> {
        let mut ids = Vec::new();
        while let Ok(env) = sub.recv_timeout(Duration::from_millis(20)) {
            ids.push(env.decode::<BackInStock>().unwrap().item_id);
        }
        ids
    }

    /// Bus that fails the first `failures` publishes.
    struct FlakyBus {
        failures: Mutex<u32>,
        inner: InMemoryEventBus<EventEnvelope<JsonValue>>,
    }

    impl EventBus<EventEnvelope<JsonValue>> for FlakyBus {
        type Error = BusError;

        fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), BusError> {
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(BusError::Transport("broker down".into()));
            }
            self.inner.publish(message)
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn zero_to_positive_triggers_exactly_once() {
        let store = store_with(7, 0).await;
        let bus = bus();
        let sub = bus.subscribe();
        let svc = RestockService::new(store.clone(), bus);

        let summary = svc.restock(vec![entry(7, 4)]).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.notified_items, vec![id(7)]);
        assert_eq!(drain(&sub), vec![id(7)]);

        let item = store.get_item(id(7)).await.unwrap().unwrap();
        assert_eq!(item.stock_quantity(), 4);
        assert!(item.available());
    }

    #[tokio::test]
    async fn top_up_of_available_item_triggers_nothing() {
        let store = store_with(7, 5).await;
        let bus = bus();
        let sub = bus.subscribe();
        let svc = RestockService::new(store.clone(), bus);

        let summary = svc.restock(vec![entry(7, 3)]).await.unwrap();
        assert!(summary.notified_items.is_empty());
        assert!(drain(&sub).is_empty());
        assert_eq!(store.get_item(id(7)).await.unwrap().unwrap().stock_quantity(), 8);
    }

    #[tokio::test]
    async fn new_items_are_inserted_without_trigger() {
        let store = store_with(7, 0).await;
        let bus = bus();
        let sub = bus.subscribe();
        let svc = RestockService::new(store, bus);

        let summary = svc
            .restock(vec![entry(7, 2), entry(30, 6), entry(7, 1)])
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.notified_items, vec![id(7)]);
        assert_eq!(drain(&sub), vec![id(7)]);
    }

    #[tokio::test]
    async fn invalid_entry_rejects_the_whole_call_before_writing() {
        let store = store_with(7, 0).await;
        let svc = RestockService::new(store.clone(), bus());

        let bad = RestockEntry {
            item_id: id(8),
            name: "brioche".into(),
            quantity: 0,
        };
        let err = svc.restock(vec![entry(7, 4), bad]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.get_item(id(7)).await.unwrap().unwrap().stock_quantity(), 0);

        assert!(matches!(
            svc.restock(Vec::new()).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_trigger_is_retried_once_and_never_rolls_back_stock() {
        let store = store_with(7, 0).await;
        let bus = Arc::new(FlakyBus {
            failures: Mutex::new(1),
            inner: InMemoryEventBus::new(),
        });
        let sub = bus.subscribe();
        let svc = RestockService::new(store.clone(), bus.clone());

        let summary = svc.restock(vec![entry(7, 4)]).await.unwrap();
        assert_eq!(summary.notified_items, vec![id(7)]);
        assert_eq!(drain(&sub).len(), 1);

        // Sell out, then fail both attempts.
        store
            .sell(crate::store::SaleRequest {
                item_id: id(7),
                customer_email: crate::services::testing::email("c@padaria.test"),
                quantity: 4,
            })
            .await
            .unwrap();
        *bus.failures.lock().unwrap() = 2;

        let summary = svc.restock(vec![entry(7, 2)]).await.unwrap();
        assert!(summary.notified_items.is_empty());
        assert_eq!(summary.trigger_failures, vec![id(7)]);
        assert_eq!(store.get_item(id(7)).await.unwrap().unwrap().stock_quantity(), 2);
    }
}
