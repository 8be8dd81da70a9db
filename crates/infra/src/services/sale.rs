use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use quitute_core::{CustomerEmail, ItemId, ReservationId};

use crate::error::ServiceError;
use crate::store::{SaleRequest, StockLedger};

/// Result of a committed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOutcome {
    pub item_id: ItemId,
    pub item_name: String,
    pub sold_quantity: i64,
    pub remaining_stock: i64,
    pub available: bool,
    pub reservation_id: ReservationId,
}

/// Atomically decrements stock and appends a reservation, or fails without
/// side effects. Never triggers notifications.
pub struct SaleService<S: ?Sized> {
    store: Arc<S>,
}

impl<S> SaleService<S>
where
    S: StockLedger + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(item_id = %item_id, customer = %customer_email))]
    pub async fn sell(
        &self,
        item_id: ItemId,
        quantity: i64,
        customer_email: &CustomerEmail,
    ) -> Result<SaleOutcome, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "quantity must be greater than 0 (got {quantity})"
            )));
        }

        let request = SaleRequest {
            item_id,
            customer_email: customer_email.clone(),
            quantity,
        };

        let receipt = match self.store.sell(request).await {
            Ok(receipt) => receipt,
            Err(err) => {
                let err = ServiceError::from(err);
                warn!(error = %err, "sale rejected");
                return Err(err);
            }
        };

        info!(
            remaining_stock = receipt.item.stock_quantity(),
            reservation_id = %receipt.reservation.id,
            "sale committed"
        );

        Ok(SaleOutcome {
            item_id,
            item_name: receipt.item.name().to_string(),
            sold_quantity: receipt.reservation.quantity,
            remaining_stock: receipt.item.stock_quantity(),
            available: receipt.item.available(),
            reservation_id: receipt.reservation.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{email, id, store_with};
    use crate::store::ReservationLog;

    #[tokio::test]
    async fn selling_the_last_units_makes_item_unavailable() {
        let store = store_with(7, 4).await;
        let sales = SaleService::new(store.clone());

        let out = sales.sell(id(7), 4, &email("c@padaria.test")).await.unwrap();
        assert_eq!(out.sold_quantity, 4);
        assert_eq!(out.remaining_stock, 0);
        assert!(!out.available);
        assert_eq!(store.reservations_for_item(id(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejections_report_stock_and_change_nothing() {
        let store = store_with(7, 2).await;
        let sales = SaleService::new(store.clone());
        let c = email("c@padaria.test");

        assert!(matches!(
            sales.sell(id(7), 0, &c).await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(
            sales.sell(id(7), 3, &c).await,
            Err(ServiceError::InsufficientStock {
                item_id: id(7),
                requested: 3,
                stock_quantity: 2
            })
        );
        assert_eq!(
            sales.sell(id(8), 1, &c).await,
            Err(ServiceError::NotFound(id(8)))
        );

        sales.sell(id(7), 2, &c).await.unwrap();
        assert_eq!(
            sales.sell(id(7), 1, &c).await,
            Err(ServiceError::OutOfStock {
                item_id: id(7),
                stock_quantity: 0
            })
        );
        assert_eq!(store.reservations_for_item(id(7)).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_sales_through_the_service_never_oversell() {
        let store = store_with(7, 25).await;
        let sales = Arc::new(SaleService::new(store.clone()));

        let handles: Vec<_> = (0..40)
            .map(|n| {
                let sales = sales.clone();
                tokio::spawn(async move {
                    let customer = email(&format!("c{n}@padaria.test"));
                    sales.sell(id(7), 1, &customer).await.ok().map(|o| o.sold_quantity)
                })
            })
            .collect();

        let mut sold = 0;
        for h in handles {
            sold += h.await.unwrap().unwrap_or(0);
        }
        assert_eq!(sold, 25);
        assert_eq!(store.get_item(id(7)).await.unwrap().unwrap().stock_quantity(), 0);
    }
}
