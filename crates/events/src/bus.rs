//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus decouples the caller that detects a restock transition from the
//! process that sends notifications. It is intentionally **lightweight**:
//!
//! - **Transport-agnostic**: in-memory channels, Redis Streams, message queues
//! - **At-least-once delivery**: consumers must be idempotent
//! - **No ordering guarantees** across publishers
//! - **Settlement is optional**: durable transports redeliver what was not acked
//!
//! The stock ledger stays the source of truth; a lost trigger only delays a
//! notification that can be re-run by hand.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use thiserror::Error;

/// Bus-level failure, shared by every transport so callers can hold any bus
/// behind one trait object.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,

    /// The underlying transport refused or dropped the message.
    #[error("event bus transport error: {0}")]
    Transport(String),

    /// The message could not be encoded for the transport.
    #[error("event serialization failed: {0}")]
    Serialize(String),
}

/// Consumer verdict on the oldest received, unsettled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Handled (or deliberately dropped); the transport may forget it.
    Ack,
    /// Not handled; the transport should redeliver it later.
    Nack,
}

/// A subscription to an event stream.
///
/// In-memory subscriptions each get a copy of every message published after
/// they were created. Durable transports may instead share messages among a
/// group of subscriptions and expect a settlement for each one.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => match handle(event) {
///             Ok(()) => subscription.ack(),
///             Err(_) => subscription.nack(),
///         },
///         Err(RecvTimeoutError::Timeout) => continue,   // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus closed
///     }
/// }
/// ```
///
/// Subscriptions are meant for a single consuming thread, which settles
/// messages in the order it received them.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    settlement: Option<Sender<Settlement>>,
}

impl<M> Subscription<M> {
    /// A subscription whose transport does not track settlement.
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            settlement: None,
        }
    }

    /// A subscription that reports each settlement back to its transport.
    pub fn with_settlement(receiver: Receiver<M>, settlement: Sender<Settlement>) -> Self {
        Self {
            receiver,
            settlement: Some(settlement),
        }
    }

    /// Settle the oldest unsettled message as handled.
    pub fn ack(&self) {
        self.settle(Settlement::Ack);
    }

    /// Settle the oldest unsettled message as not handled.
    pub fn nack(&self) {
        self.settle(Settlement::Nack);
    }

    fn settle(&self, verdict: Settlement) {
        if let Some(tx) = &self.settlement {
            // A gone transport will redeliver anyway.
            let _ = tx.send(verdict);
        }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Restock (commit stock) → EventBus (publish) → NotificationWorker → Dispatcher
/// ```
///
/// Stock is **committed first**, then the trigger is published. A failed
/// publish never undoes the commit; the notification can always be re-run
/// by hand because the dispatcher reads its preconditions fresh.
///
/// `publish()` must not block on consumers.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn settlements_reach_the_transport_in_order() {
        let (tx, rx) = mpsc::channel();
        let (settle_tx, settle_rx) = mpsc::channel();
        let sub = Subscription::with_settlement(rx, settle_tx);

        tx.send("first").unwrap();
        tx.send("second").unwrap();
        assert_eq!(sub.recv().unwrap(), "first");
        sub.ack();
        assert_eq!(sub.recv().unwrap(), "second");
        sub.nack();

        let verdicts: Vec<_> = settle_rx.try_iter().collect();
        assert_eq!(verdicts, vec![Settlement::Ack, Settlement::Nack]);
    }

    #[test]
    fn settling_without_a_tracking_transport_is_a_no_op() {
        let (tx, rx) = mpsc::channel();
        let sub = Subscription::new(rx);
        tx.send(1).unwrap();
        assert_eq!(sub.try_recv().unwrap(), 1);
        sub.ack();
        sub.nack();
    }

    #[test]
    fn settling_after_the_transport_is_gone_does_not_panic() {
        let (_tx, rx) = mpsc::channel::<u8>();
        let (settle_tx, settle_rx) = mpsc::channel();
        drop(settle_rx);
        let sub = Subscription::with_settlement(rx, settle_tx);
        sub.ack();
    }
}
