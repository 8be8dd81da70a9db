//! The operations callers invoke: sale, availability check, restock,
//! notification dispatch and e-mail subscription.
//!
//! Services hold no state of their own besides configuration; every
//! coordination point is the store, so any number of service instances in
//! any number of processes may run against the same rows.

pub mod availability;
pub mod dispatcher;
pub mod restock;
pub mod sale;
pub mod subscription;

pub use availability::{AvailabilityOutcome, AvailabilityService};
pub use dispatcher::{DispatchReport, DispatchStatus, DispatcherConfig, NotificationDispatcher};
pub use restock::{RestockFailure, RestockService, RestockSummary};
pub use sale::{SaleOutcome, SaleService};
pub use subscription::{SubscriptionOutcome, SubscriptionService};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use quitute_core::{CustomerEmail, ItemId};
    use quitute_inventory::{Item, RestockEntry};

    use crate::store::{InMemoryStore, StockLedger};

    pub fn id(raw: i64) -> ItemId {
        ItemId::try_new(raw).unwrap()
    }

    pub fn email(raw: &str) -> CustomerEmail {
        CustomerEmail::parse(raw).unwrap()
    }

    /// A store holding item `item` named "coxinha" with `stock` units.
    pub async fn store_with(item: i64, stock: i64) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.seed(Item::new(id(item), "coxinha").unwrap()).await.unwrap();
        if stock > 0 {
            store
                .restock(&RestockEntry::new(id(item), "coxinha", stock).unwrap())
                .await
                .unwrap();
        }
        store
    }
}
