//! Background consumer of back-in-stock triggers.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use quitute_core::ItemId;
use quitute_events::{EventBus, EventEnvelope, Settlement, Subscription};
use quitute_inventory::BackInStock;

use crate::retry::RetryPolicy;
use crate::services::NotificationDispatcher;
use crate::store::{InterestRegistry, StockLedger, SubscriptionDirectory};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Runs the notification dispatcher for every back-in-stock trigger on a bus.
///
/// - Subscribes before returning, so triggers published afterwards are seen
/// - Decodes each envelope and calls `notify_interested(item_id)`
/// - Retries retryable failures (`StoreUnavailable`, `ChannelUnavailable`)
///   with the given policy; anything else is logged and dropped
/// - Acks handled (and dropped) triggers; nacks ones whose retries ran out or
///   that could not be decoded, so a durable bus redelivers or dead-letters them
/// - Duplicate triggers are harmless: the dispatcher is idempotent
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Spawn the worker thread. Async dispatcher calls run on `runtime`.
    pub fn spawn<B, S>(
        name: &'static str,
        bus: B,
        dispatcher: Arc<NotificationDispatcher<S>>,
        runtime: tokio::runtime::Handle,
        retry: RetryPolicy,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
        S: StockLedger + InterestRegistry + SubscriptionDirectory + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Keep the bus alive for as long as we are subscribed to it.
                let _bus = bus;
                let ctx = WorkerContext {
                    name,
                    dispatcher,
                    runtime,
                    retry,
                };
                ctx.run(sub, shutdown_rx)
            })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

struct WorkerContext<S: ?Sized> {
    name: &'static str,
    dispatcher: Arc<NotificationDispatcher<S>>,
    runtime: tokio::runtime::Handle,
    retry: RetryPolicy,
}

impl<S> WorkerContext<S>
where
    S: StockLedger + InterestRegistry + SubscriptionDirectory + ?Sized,
{
    fn run(&self, sub: Subscription<EventEnvelope<JsonValue>>, shutdown_rx: mpsc::Receiver<()>) {
        let tick = Duration::from_millis(250);

        loop {
            // Shutdown requested, or the handle was dropped.
            match shutdown_rx.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
                Err(mpsc::TryRecvError::Empty) => {}
            }

            match sub.recv_timeout(tick) {
                Ok(envelope) => match self.handle(envelope) {
                    Settlement::Ack => sub.ack(),
                    Settlement::Nack => sub.nack(),
                },
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(worker = self.name, "notification worker stopped");
    }

    fn handle(&self, envelope: EventEnvelope<JsonValue>) -> Settlement {
        if envelope.event_type() != BackInStock::EVENT_TYPE {
            return Settlement::Ack;
        }

        match envelope.decode::<BackInStock>() {
            Ok(event) => self.dispatch(event.item_id),
            Err(err) => {
                warn!(
                    worker = self.name,
                    event_id = %envelope.event_id(),
                    error = %err,
                    "undecodable back-in-stock trigger"
                );
                Settlement::Nack
            }
        }
    }

    fn dispatch(&self, item_id: ItemId) -> Settlement {
        let mut attempt = 0;
        loop {
            match self.runtime.block_on(self.dispatcher.notify_interested(item_id)) {
                Ok(report) => {
                    info!(
                        worker = self.name,
                        item_id = %item_id,
                        status = ?report.status,
                        emails_sent = report.emails_sent,
                        "trigger handled"
                    );
                    return Settlement::Ack;
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        worker = self.name,
                        item_id = %item_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "dispatch failed, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) if err.is_retryable() => {
                    error!(
                        worker = self.name,
                        item_id = %item_id,
                        error = %err,
                        "dispatch retries exhausted, trigger left for redelivery"
                    );
                    return Settlement::Nack;
                }
                Err(err) => {
                    error!(worker = self.name, item_id = %item_id, error = %err, "dispatch abandoned");
                    return Settlement::Ack;
                }
            }
        }
    }
}
