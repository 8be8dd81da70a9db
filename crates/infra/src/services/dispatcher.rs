use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use quitute_core::ItemId;

use crate::error::ServiceError;
use crate::messaging::{MessageChannel, templates};
use crate::store::{InterestRegistry, StockLedger, SubscriptionDirectory};

pub const DEFAULT_TOPIC: &str = "item-available";

/// How long one run may hold a recipient before another run can take over.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(60);

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Topic the messages are published on.
    pub topic: String,
    /// Skip (without error) recipients with no active subscription.
    pub require_subscription: bool,
    /// Upper bound on one send; a claim older than this is considered abandoned.
    pub claim_lease: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            require_subscription: false,
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }
}

impl DispatcherConfig {
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_require_subscription(mut self, require: bool) -> Self {
        self.require_subscription = require;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Pending records were processed (individual sends may still have failed).
    Dispatched,
    /// The item is not available right now; nothing was sent.
    NotAvailable,
    /// Nobody is waiting for this item.
    NoPendingInterest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub item_id: ItemId,
    pub status: DispatchStatus,
    pub emails_sent: usize,
    pub already_notified_skipped: usize,
    /// Pending when read, but being sent (or already sent) by an overlapping run.
    pub claimed_elsewhere_skipped: usize,
    pub unsubscribed_skipped: usize,
    /// Recipients whose send (or subscription lookup) failed; still pending.
    pub failed: usize,
}

impl DispatchReport {
    fn empty(item_id: ItemId, status: DispatchStatus) -> Self {
        Self {
            item_id,
            status,
            emails_sent: 0,
            already_notified_skipped: 0,
            claimed_elsewhere_skipped: 0,
            unsubscribed_skipped: 0,
            failed: 0,
        }
    }
}

/// Delivers back-in-stock messages to everyone waiting for an item and marks
/// each of them notified.
///
/// Re-entrant: every recipient is claimed in the store before the send and
/// marked (for the revision it was claimed at) after it, so overlapping or
/// repeated runs for the same item never message a customer twice, short of a
/// crash between a send and its mark. That claim then lapses and the customer
/// may be messaged again.
pub struct NotificationDispatcher<S: ?Sized> {
    store: Arc<S>,
    channel: Arc<dyn MessageChannel>,
    config: DispatcherConfig,
}

impl<S> NotificationDispatcher<S>
where
    S: StockLedger + InterestRegistry + SubscriptionDirectory + ?Sized,
{
    pub fn new(store: Arc<S>, channel: Arc<dyn MessageChannel>, config: DispatcherConfig) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn notify_interested(&self, item_id: ItemId) -> Result<DispatchReport, ServiceError> {
        // Re-read: stock may have sold out since the trigger was emitted.
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(ServiceError::NotFound(item_id))?;
        if !item.is_available() {
            info!("item not available, nothing to dispatch");
            return Ok(DispatchReport::empty(item_id, DispatchStatus::NotAvailable));
        }

        let (pending, notified): (Vec<_>, Vec<_>) = self
            .store
            .interests_for_item(item_id)
            .await?
            .into_iter()
            .partition(|r| r.is_pending());

        let mut report = DispatchReport::empty(item_id, DispatchStatus::Dispatched);
        report.already_notified_skipped = notified.len();
        if pending.is_empty() {
            report.status = DispatchStatus::NoPendingInterest;
            debug!(already_notified = notified.len(), "no pending interest");
            return Ok(report);
        }

        // Each recipient is its own unit of work; failures never stop the loop.
        for record in pending {
            let customer = &record.customer_email;

            if self.config.require_subscription {
                match self.store.is_subscribed(customer).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(customer = %customer, "no active subscription, skipped");
                        report.unsubscribed_skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(customer = %customer, error = %err, "subscription lookup failed");
                        report.failed += 1;
                        continue;
                    }
                }
            }

            let claim = match self
                .store
                .claim_pending(customer, item_id, self.config.claim_lease)
                .await
            {
                Ok(Some(claim)) => claim,
                Ok(None) => {
                    debug!(customer = %customer, "claimed or notified by another run, skipped");
                    report.claimed_elsewhere_skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(customer = %customer, error = %err, "could not claim recipient");
                    report.failed += 1;
                    continue;
                }
            };

            let message = templates::back_in_stock(&self.config.topic, customer, &item);
            if let Err(err) = self.channel.publish(message).await {
                warn!(customer = %customer, error = %err, "send failed, record left pending");
                report.failed += 1;
                if let Err(err) = self.store.release_claim(&claim).await {
                    warn!(customer = %customer, error = %err, "claim not released; it will lapse");
                }
                continue;
            }
            report.emails_sent += 1;

            match self.store.mark_notified(&claim).await {
                Ok(true) => debug!(customer = %customer, "notified"),
                Ok(false) => info!(
                    customer = %customer,
                    "customer re-registered during the send; left pending for the next restock"
                ),
                Err(err) => error!(
                    customer = %customer,
                    error = %err,
                    "sent but could not mark notified; the next run may send again"
                ),
            }
        }

        info!(
            emails_sent = report.emails_sent,
            already_notified = report.already_notified_skipped,
            claimed_elsewhere = report.claimed_elsewhere_skipped,
            unsubscribed = report.unsubscribed_skipped,
            failed = report.failed,
            "dispatch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use quitute_core::CustomerEmail;

    use crate::messaging::{
        ChannelError, InMemoryChannel, MessageChannel, OutboundMessage, SubscriptionHandle,
    };
    use crate::services::testing::{email, id, store_with};
    use crate::store::InMemoryStore;

    fn dispatcher(
        store: Arc<InMemoryStore>,
        channel: Arc<InMemoryChannel>,
        config: DispatcherConfig,
    ) -> NotificationDispatcher<InMemoryStore> {
        NotificationDispatcher::new(store, channel, config)
    }

    async fn waiting(store: &InMemoryStore, item: i64, customers: &[&str]) {
        for c in customers {
            store.register_interest(&email(c), id(item), None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn notifies_each_pending_customer_once() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test", "b@padaria.test", "c@padaria.test"]).await;
        let channel = Arc::new(InMemoryChannel::new());
        let d = dispatcher(store.clone(), channel.clone(), DispatcherConfig::default());

        let first = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(first.status, DispatchStatus::Dispatched);
        assert_eq!(first.emails_sent, 3);
        assert!(store.interests_for_item(id(7)).await.unwrap().iter().all(|r| r.notified));

        let second = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(second.status, DispatchStatus::NoPendingInterest);
        assert_eq!(second.emails_sent, 0);
        assert_eq!(second.already_notified_skipped, 3);
        assert_eq!(channel.delivered().len(), 3);
    }

    #[tokio::test]
    async fn sold_out_item_is_not_dispatched() {
        let store = store_with(7, 0).await;
        waiting(&store, 7, &["a@padaria.test"]).await;
        let channel = Arc::new(InMemoryChannel::new());
        let d = dispatcher(store.clone(), channel.clone(), DispatcherConfig::default());

        let report = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(report.status, DispatchStatus::NotAvailable);
        assert!(channel.delivered().is_empty());
        assert!(!store.interests_for_item(id(7)).await.unwrap()[0].notified);

        assert_eq!(
            d.notify_interested(id(99)).await,
            Err(ServiceError::NotFound(id(99)))
        );
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_block_the_others() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test", "b@padaria.test", "c@padaria.test"]).await;
        let channel = Arc::new(InMemoryChannel::new());
        let b = email("b@padaria.test");
        channel.fail_for(&b);
        let d = dispatcher(store.clone(), channel.clone(), DispatcherConfig::default());

        let report = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(report.emails_sent, 2);
        assert_eq!(report.failed, 1);

        let pending: Vec<_> = store
            .interests_for_item(id(7))
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_pending())
            .map(|r| r.customer_email)
            .collect();
        assert_eq!(pending, vec![b.clone()]);

        // A re-run after recovery reaches only the one left behind.
        channel.recover(&b);
        let rerun = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(rerun.emails_sent, 1);
        assert_eq!(rerun.already_notified_skipped, 2);
        assert_eq!(channel.sent_to(&b), 1);
        assert_eq!(channel.delivered().len(), 3);
    }

    #[tokio::test]
    async fn unsubscribed_recipients_are_skipped_when_required() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test", "b@padaria.test"]).await;
        let a = email("a@padaria.test");
        store
            .record_subscription(&a, &SubscriptionHandle::new("item-available:a@padaria.test"))
            .await
            .unwrap();
        let channel = Arc::new(InMemoryChannel::new());
        let config = DispatcherConfig::default().with_require_subscription(true);
        let d = dispatcher(store.clone(), channel.clone(), config);

        let report = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(report.emails_sent, 1);
        assert_eq!(report.unsubscribed_skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(channel.sent_to(&a), 1);
    }

    /// Delivers through an in-memory channel, slowly.
    struct SlowChannel {
        inner: Arc<InMemoryChannel>,
        delay: Duration,
    }

    #[async_trait]
    impl MessageChannel for SlowChannel {
        async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
            tokio::time::sleep(self.delay).await;
            self.inner.publish(message).await
        }

        async fn subscribe(
            &self,
            topic: &str,
            customer_email: &CustomerEmail,
        ) -> Result<SubscriptionHandle, ChannelError> {
            self.inner.subscribe(topic, customer_email).await
        }
    }

    /// Delivers, then has the recipient ask for the item again (once).
    struct AskAgainChannel {
        inner: Arc<InMemoryChannel>,
        store: Arc<InMemoryStore>,
        asked: AtomicBool,
    }

    #[async_trait]
    impl MessageChannel for AskAgainChannel {
        async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
            self.inner.publish(message.clone()).await?;
            if let Some(customer) = &message.recipient {
                if !self.asked.swap(true, Ordering::SeqCst) {
                    self.store
                        .register_interest(customer, id(7), None)
                        .await
                        .map_err(|e| ChannelError::Unavailable(e.to_string()))?;
                }
            }
            Ok(())
        }

        async fn subscribe(
            &self,
            topic: &str,
            customer_email: &CustomerEmail,
        ) -> Result<SubscriptionHandle, ChannelError> {
            self.inner.subscribe(topic, customer_email).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_runs_message_each_customer_once() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test", "b@padaria.test", "c@padaria.test"]).await;
        let inner = Arc::new(InMemoryChannel::new());
        let channel = Arc::new(SlowChannel {
            inner: inner.clone(),
            delay: Duration::from_millis(20),
        });
        let d = Arc::new(NotificationDispatcher::new(
            store.clone(),
            channel,
            DispatcherConfig::default(),
        ));

        let runs: Vec<_> = (0..2)
            .map(|_| {
                let d = d.clone();
                tokio::spawn(async move { d.notify_interested(id(7)).await })
            })
            .collect();
        let mut sent = 0;
        for run in runs {
            sent += run.await.unwrap().unwrap().emails_sent;
        }

        assert_eq!(sent, 3);
        assert_eq!(inner.delivered().len(), 3);
        for c in ["a@padaria.test", "b@padaria.test", "c@padaria.test"] {
            assert_eq!(inner.sent_to(&email(c)), 1);
        }
        assert!(store.interests_for_item(id(7)).await.unwrap().iter().all(|r| r.notified));
    }

    #[tokio::test]
    async fn re_registration_during_send_stays_armed() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test"]).await;
        let inner = Arc::new(InMemoryChannel::new());
        let channel = Arc::new(AskAgainChannel {
            inner: inner.clone(),
            store: store.clone(),
            asked: AtomicBool::new(false),
        });
        let d = NotificationDispatcher::new(store.clone(), channel, DispatcherConfig::default());

        let first = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(first.emails_sent, 1);
        assert!(store.interests_for_item(id(7)).await.unwrap()[0].is_pending());

        // The customer asked again after the message went out, so they hear again.
        let second = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(second.emails_sent, 1);
        assert!(store.interests_for_item(id(7)).await.unwrap()[0].notified);
        assert_eq!(inner.delivered().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_releases_the_claim() {
        let store = store_with(7, 5).await;
        waiting(&store, 7, &["a@padaria.test"]).await;
        let a = email("a@padaria.test");
        let channel = Arc::new(InMemoryChannel::new());
        channel.fail_for(&a);
        let d = dispatcher(store.clone(), channel.clone(), DispatcherConfig::default());

        assert_eq!(d.notify_interested(id(7)).await.unwrap().failed, 1);

        // Not stuck behind its own lapsed-lease window.
        channel.recover(&a);
        let rerun = d.notify_interested(id(7)).await.unwrap();
        assert_eq!(rerun.emails_sent, 1);
        assert_eq!(rerun.claimed_elsewhere_skipped, 0);
    }
}
