use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use quitute_core::CustomerEmail;

use crate::error::ServiceError;
use crate::messaging::{MessageChannel, SubscriptionHandle};
use crate::store::SubscriptionDirectory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOutcome {
    pub email: CustomerEmail,
    pub subscription_handle: SubscriptionHandle,
}

/// Subscribes customer addresses to the notification topic and remembers
/// them so the dispatcher can check for an active subscription.
pub struct SubscriptionService<S: ?Sized> {
    store: Arc<S>,
    channel: Arc<dyn MessageChannel>,
    topic: String,
}

impl<S> SubscriptionService<S>
where
    S: SubscriptionDirectory + ?Sized,
{
    pub fn new(store: Arc<S>, channel: Arc<dyn MessageChannel>, topic: impl Into<String>) -> Self {
        Self {
            store,
            channel,
            topic: topic.into(),
        }
    }

    /// Idempotent: subscribing twice refreshes the stored handle.
    #[instrument(skip(self), fields(customer = %email))]
    pub async fn subscribe(&self, email: &CustomerEmail) -> Result<SubscriptionOutcome, ServiceError> {
        let handle = self.channel.subscribe(&self.topic, email).await?;
        self.store.record_subscription(email, &handle).await?;
        info!(handle = %handle, "subscription recorded");

        Ok(SubscriptionOutcome {
            email: email.clone(),
            subscription_handle: handle,
        })
    }
}
