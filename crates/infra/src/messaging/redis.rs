//! Redis-backed messaging channel (optional).
//!
//! Messages are published as JSON on a pub/sub channel named after the topic;
//! subscribers are kept in a Redis set `<topic>:subscribers`. An external
//! mailer process consumes the channel and does the actual e-mail delivery.

use async_trait::async_trait;
use redis::Commands;

use quitute_core::CustomerEmail;

use super::{ChannelError, MessageChannel, OutboundMessage, SubscriptionHandle};

#[derive(Debug, Clone)]
pub struct RedisChannel {
    client: redis::Client,
}

impl RedisChannel {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ChannelError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn subscribers_key(topic: &str) -> String {
        format!("{topic}:subscribers")
    }
}

fn unavailable(e: impl ToString) -> ChannelError {
    ChannelError::Unavailable(e.to_string())
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let payload =
            serde_json::to_string(&message).map_err(|e| ChannelError::Rejected(e.to_string()))?;
        let client = self.client.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection().map_err(unavailable)?;
            let _: i64 = conn.publish(&message.topic, payload).map_err(unavailable)?;
            Ok::<_, ChannelError>(())
        })
        .await
        .map_err(unavailable)?
    }

    async fn subscribe(
        &self,
        topic: &str,
        customer_email: &CustomerEmail,
    ) -> Result<SubscriptionHandle, ChannelError> {
        let client = self.client.clone();
        let key = Self::subscribers_key(topic);
        let handle = SubscriptionHandle::new(format!("{topic}:{customer_email}"));
        let member = customer_email.as_str().to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection().map_err(unavailable)?;
            let _: i64 = conn.sadd(key, member).map_err(unavailable)?;
            Ok::<_, ChannelError>(())
        })
        .await
        .map_err(unavailable)??;

        Ok(handle)
    }
}
