//! Outbound messaging channel: "publish to a topic, optionally addressed to
//! one recipient" and "subscribe an address to a topic".
//!
//! Delivery is best-effort from the core's point of view. A failed publish is
//! reported per call so the dispatcher can isolate it to one recipient.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod templates;

pub use in_memory::InMemoryChannel;
#[cfg(feature = "redis")]
pub use self::redis::RedisChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quitute_core::CustomerEmail;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel could not be reached or refused delivery; may succeed later.
    #[error("messaging channel unavailable: {0}")]
    Unavailable(String),

    /// The channel refused this particular message or address.
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),
}

/// A message handed to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    /// `None` broadcasts to every subscriber of the topic.
    pub recipient: Option<CustomerEmail>,
    pub subject: String,
    pub body: String,
}

/// Opaque handle returned by the channel for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), ChannelError>;

    async fn subscribe(
        &self,
        topic: &str,
        customer_email: &CustomerEmail,
    ) -> Result<SubscriptionHandle, ChannelError>;
}
