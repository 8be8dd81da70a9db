use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use quitute_core::{CustomerEmail, ItemId};
use quitute_inventory::InterestRecord;

use crate::error::ServiceError;
use crate::messaging::{MessageChannel, templates};
use crate::store::{InterestRegistry, StockLedger};

/// Answer to "is item X available for customer Y".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOutcome {
    pub item_id: ItemId,
    pub item_name: String,
    pub available: bool,
    pub stock_quantity: i64,
    pub interest_registered: bool,
    /// Only meaningful when `available`: whether the pickup notice went out.
    pub pickup_notice_sent: bool,
}

/// Availability checks, and interest registration as their side effect.
pub struct AvailabilityService<S: ?Sized> {
    store: Arc<S>,
    channel: Arc<dyn MessageChannel>,
    topic: String,
}

impl<S> AvailabilityService<S>
where
    S: StockLedger + InterestRegistry + ?Sized,
{
    pub fn new(store: Arc<S>, channel: Arc<dyn MessageChannel>, topic: impl Into<String>) -> Self {
        Self {
            store,
            channel,
            topic: topic.into(),
        }
    }

    /// Available: send a best-effort pickup notice, mutate nothing.
    /// Unavailable: upsert the interest record and re-arm it.
    #[instrument(skip(self), fields(item_id = %item_id, customer = %customer_email))]
    pub async fn check_availability(
        &self,
        item_id: ItemId,
        customer_email: &CustomerEmail,
    ) -> Result<AvailabilityOutcome, ServiceError> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(ServiceError::NotFound(item_id))?;

        if item.is_available() {
            let notice = templates::pickup_notice(&self.topic, customer_email, &item);
            let pickup_notice_sent = match self.channel.publish(notice).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "pickup notice failed");
                    false
                }
            };
            info!(stock_quantity = item.stock_quantity(), "item available");

            return Ok(AvailabilityOutcome {
                item_id,
                item_name: item.name().to_string(),
                available: true,
                stock_quantity: item.stock_quantity(),
                interest_registered: false,
                pickup_notice_sent,
            });
        }

        let record = self
            .store
            .register_interest(customer_email, item_id, None)
            .await?;
        info!(
            desired_quantity = record.desired_quantity,
            "item unavailable, interest registered"
        );

        Ok(AvailabilityOutcome {
            item_id,
            item_name: item.name().to_string(),
            available: false,
            stock_quantity: item.stock_quantity(),
            interest_registered: true,
            pickup_notice_sent: false,
        })
    }

    /// Explicit "notify me" action. Same upsert and re-arm as the unavailable
    /// path of [`Self::check_availability`], but also records the quantity the
    /// customer wants and works whatever the current stock.
    #[instrument(skip(self), fields(item_id = %item_id, customer = %customer_email))]
    pub async fn register_interest(
        &self,
        item_id: ItemId,
        customer_email: &CustomerEmail,
        desired_quantity: Option<i64>,
    ) -> Result<InterestRecord, ServiceError> {
        if let Some(q) = desired_quantity {
            if q <= 0 {
                return Err(ServiceError::Validation(format!(
                    "desired_quantity must be greater than 0 (got {q})"
                )));
            }
        }
        if self.store.get_item(item_id).await?.is_none() {
            return Err(ServiceError::NotFound(item_id));
        }

        let record = self
            .store
            .register_interest(customer_email, item_id, desired_quantity)
            .await?;
        info!(desired_quantity = record.desired_quantity, "interest registered");
        Ok(record)
    }
}
