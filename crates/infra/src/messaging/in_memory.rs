use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use quitute_core::CustomerEmail;

use super::{ChannelError, MessageChannel, OutboundMessage, SubscriptionHandle};

/// Channel that records every delivery in memory.
///
/// Deliveries to recipients registered with [`InMemoryChannel::fail_for`]
/// fail with `ChannelError::Unavailable`, which lets tests exercise
/// per-recipient failure isolation.
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    delivered: Mutex<Vec<OutboundMessage>>,
    subscribers: Mutex<HashMap<String, BTreeSet<CustomerEmail>>>,
    failing: Mutex<HashSet<CustomerEmail>>,
    offline: AtomicBool,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery addressed to `email` fail until [`Self::recover`].
    pub fn fail_for(&self, email: &CustomerEmail) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(email.clone());
        }
    }

    pub fn recover(&self, email: &CustomerEmail) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(email);
        }
    }

    /// Fail every publish and subscribe while `true`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Number of messages delivered to `email` specifically.
    pub fn sent_to(&self, email: &CustomerEmail) -> usize {
        self.delivered()
            .iter()
            .filter(|m| m.recipient.as_ref() == Some(email))
            .count()
    }

    pub fn subscribers(&self, topic: &str) -> Vec<CustomerEmail> {
        self.subscribers
            .lock()
            .ok()
            .and_then(|s| s.get(topic).map(|set| set.iter().cloned().collect()))
            .unwrap_or_default()
    }

    fn ensure_online(&self) -> Result<(), ChannelError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable("channel offline".to_string()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> ChannelError {
    ChannelError::Unavailable("in-memory channel lock poisoned".to_string())
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.ensure_online()?;
        if let Some(recipient) = &message.recipient {
            if self.failing.lock().map_err(poisoned)?.contains(recipient) {
                return Err(ChannelError::Unavailable(format!(
                    "delivery to {recipient} failed"
                )));
            }
        }
        self.delivered.lock().map_err(poisoned)?.push(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        customer_email: &CustomerEmail,
    ) -> Result<SubscriptionHandle, ChannelError> {
        self.ensure_online()?;
        self.subscribers
            .lock()
            .map_err(poisoned)?
            .entry(topic.to_string())
            .or_default()
            .insert(customer_email.clone());
        Ok(SubscriptionHandle::new(format!("{topic}:{customer_email}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &CustomerEmail) -> OutboundMessage {
        OutboundMessage {
            topic: "item-available".into(),
            recipient: Some(to.clone()),
            subject: "hi".into(),
            body: "hello".into(),
        }
    }

    #[tokio::test]
    async fn failing_recipient_does_not_affect_others() {
        let channel = InMemoryChannel::new();
        let ana = CustomerEmail::parse("ana@padaria.test").unwrap();
        let bia = CustomerEmail::parse("bia@padaria.test").unwrap();
        channel.fail_for(&ana);

        assert!(channel.publish(message(&ana)).await.is_err());
        channel.publish(message(&bia)).await.unwrap();
        assert_eq!(channel.sent_to(&ana), 0);
        assert_eq!(channel.sent_to(&bia), 1);

        channel.recover(&ana);
        channel.publish(message(&ana)).await.unwrap();
        assert_eq!(channel.sent_to(&ana), 1);
    }

    #[tokio::test]
    async fn subscribe_returns_topic_scoped_handle() {
        let channel = InMemoryChannel::new();
        let ana = CustomerEmail::parse("ana@padaria.test").unwrap();
        let handle = channel.subscribe("item-available", &ana).await.unwrap();
        assert_eq!(handle.as_str(), "item-available:ana@padaria.test");
        assert_eq!(channel.subscribers("item-available"), vec![ana]);
    }
}
