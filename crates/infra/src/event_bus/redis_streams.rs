//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! - **Durable**: triggers stay in the stream until a consumer acks them
//! - **Consumer group**: each trigger goes to one worker of the group, no
//!   matter how many API processes subscribe
//! - **Redelivery**: entries left pending (nacked, or held by a consumer that
//!   died) are reclaimed once idle for `pending_timeout`
//! - **Dead letters**: entries delivered `max_deliveries` times are moved to
//!   the dead-letter stream and acked
//!
//! Stream layout: `quitute:back-in-stock` holds one entry per trigger with
//! fields `event_type`, `event_id` and `payload` (the JSON envelope).

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, error, instrument, warn};

use quitute_events::{BusError, EventBus, EventEnvelope, Settlement, Subscription};

pub const DEFAULT_STREAM_KEY: &str = "quitute:back-in-stock";
pub const DEFAULT_DLQ_KEY: &str = "quitute:back-in-stock:dlq";
pub const DEFAULT_GROUP: &str = "quitute.notifications";

const DEFAULT_MAX_DELIVERIES: u64 = 5;
const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(60);
const READ_COUNT: usize = 10;
const BLOCK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: redis::Client,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    max_deliveries: u64,
    pending_timeout: Duration,
}

fn transport(err: redis::RedisError) -> BusError {
    BusError::Transport(err.to_string())
}

impl RedisStreamsEventBus {
    /// Bus on `stream_key`, consuming as a fresh member of the default group.
    pub fn new(redis_url: impl AsRef<str>, stream_key: impl Into<String>) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(transport)?;
        let stream_key = stream_key.into();
        Ok(Self {
            client,
            dlq_key: format!("{stream_key}:dlq"),
            stream_key,
            group: DEFAULT_GROUP.to_string(),
            consumer: format!("notifier-{}", uuid::Uuid::now_v7()),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
        })
    }

    /// Consumer group and the (process-unique) consumer name within it.
    pub fn with_consumer(mut self, group: impl Into<String>, consumer: impl Into<String>) -> Self {
        self.group = group.into();
        self.consumer = consumer.into();
        self
    }

    pub fn with_dlq_key(mut self, dlq_key: impl Into<String>) -> Self {
        self.dlq_key = dlq_key.into();
        self
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u64) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Create the consumer group (and the stream) if missing.
    pub fn ensure_consumer_group(&self) -> Result<(), BusError> {
        let mut conn = self.client.get_connection().map_err(transport)?;
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);
        match created {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(transport(err)),
        }
    }

    fn ack(&self, conn: &mut redis::Connection, ids: &[String]) -> Result<(), BusError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(ids)
            .query(conn)
            .map_err(transport)?;
        Ok(())
    }

    fn dead_letter(
        &self,
        conn: &mut redis::Connection,
        entry: &StreamEntry,
        deliveries: u64,
    ) -> Result<(), BusError> {
        let _: String = redis::cmd("XADD")
            .arg(&self.dlq_key)
            .arg("*")
            .arg("original_id")
            .arg(&entry.id)
            .arg("deliveries")
            .arg(deliveries)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("payload")
            .arg(&entry.payload)
            .query(conn)
            .map_err(transport)?;
        self.ack(conn, std::slice::from_ref(&entry.id))?;
        warn!(entry_id = %entry.id, deliveries, "trigger moved to dead letters");
        Ok(())
    }

    /// Take over entries idle for longer than the pending timeout, whichever
    /// consumer holds them. Over-delivered ones go to dead letters instead.
    fn reclaim_idle(&self, conn: &mut redis::Connection) -> Result<Vec<StreamEntry>, BusError> {
        let min_idle = self.pending_timeout.as_millis() as u64;
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle)
            .arg("-")
            .arg("+")
            .arg(READ_COUNT)
            .query(conn)
            .map_err(transport)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let deliveries: HashMap<String, u64> = pending
            .into_iter()
            .map(|(id, _consumer, _idle, count)| (id, count))
            .collect();
        let ids: Vec<String> = deliveries.keys().cloned().collect();
        let claimed: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle)
            .arg(&ids[..])
            .query(conn)
            .map_err(transport)?;

        let mut entries = Vec::new();
        for entry in parse_entries(claimed) {
            let count = deliveries.get(&entry.id).copied().unwrap_or(0);
            if count >= self.max_deliveries {
                self.dead_letter(conn, &entry, count)?;
            } else {
                debug!(entry_id = %entry.id, deliveries = count, "reclaimed idle trigger");
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn read_new(&self, conn: &mut redis::Connection) -> Result<Vec<StreamEntry>, BusError> {
        let reply: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_COUNT)
            .arg("BLOCK")
            .arg(BLOCK.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query(conn)
            .map_err(transport)?;
        Ok(parse_read_reply(reply, &self.stream_key))
    }

    /// Poll loop behind a subscription. Returns when the subscriber is gone.
    fn consume(
        &self,
        tx: mpsc::Sender<EventEnvelope<JsonValue>>,
        settlements: mpsc::Receiver<Settlement>,
    ) {
        let mut conn: Option<redis::Connection> = None;
        // Entry ids handed to the subscriber, oldest first, awaiting settlement.
        let mut in_flight: VecDeque<String> = VecDeque::new();

        loop {
            if conn.is_none() {
                match self.client.get_connection() {
                    Ok(c) => conn = Some(c),
                    Err(err) => {
                        warn!(error = %err, "redis bus consumer could not connect, retrying");
                        thread::sleep(Duration::from_secs(1));
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else { continue };

            // Settle before reading more.
            if !in_flight.is_empty() {
                match settlements.recv_timeout(BLOCK) {
                    Ok(verdict) => {
                        let Some(id) = in_flight.pop_front() else { continue };
                        if verdict == Settlement::Ack {
                            if let Err(err) = self.ack(c, &[id]) {
                                error!(error = %err, "ack failed; trigger will be redelivered");
                                conn = None;
                            }
                        } else {
                            debug!(entry_id = %id, "trigger nacked, left pending for redelivery");
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => return,
                }
                continue;
            }

            // Nothing in flight: stop once the subscription has been dropped.
            if let Err(mpsc::TryRecvError::Disconnected) = settlements.try_recv() {
                return;
            }

            let entries = match self.reclaim_idle(c) {
                Ok(reclaimed) if !reclaimed.is_empty() => Ok(reclaimed),
                Ok(_) => self.read_new(c),
                Err(err) => Err(err),
            };
            let entries = match entries {
                Ok(entries) => entries,
                Err(err) => {
                    error!(error = %err, "reading trigger stream failed");
                    conn = None;
                    thread::sleep(Duration::from_secs(1));
                    // The group may not exist yet if Redis was down at subscribe time.
                    let _ = self.ensure_consumer_group();
                    continue;
                }
            };

            for entry in entries {
                match serde_json::from_str::<EventEnvelope<JsonValue>>(&entry.payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).is_err() {
                            return;
                        }
                        in_flight.push_back(entry.id);
                    }
                    Err(err) => {
                        warn!(entry_id = %entry.id, error = %err, "malformed trigger");
                        if let Err(err) = self.dead_letter(c, &entry, 0) {
                            error!(error = %err, "could not park malformed trigger");
                        }
                    }
                }
            }
        }
    }
}

impl EventBus<EventEnvelope<JsonValue>> for RedisStreamsEventBus {
    type Error = BusError;

    #[instrument(skip(self, message), fields(stream = %self.stream_key, event_id = %message.event_id()), err)]
    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        let payload =
            serde_json::to_string(&message).map_err(|e| BusError::Serialize(e.to_string()))?;
        let mut conn = self.client.get_connection().map_err(transport)?;

        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("event_type")
            .arg(message.event_type())
            .arg("event_id")
            .arg(message.event_id().to_string())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(transport)?;
        Ok(())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        if let Err(err) = self.ensure_consumer_group() {
            // The poll loop fails (and retries) until the group exists.
            error!(group = %self.group, error = %err, "could not create consumer group");
        }

        let (tx, rx) = mpsc::channel();
        let (settle_tx, settle_rx) = mpsc::channel();
        let bus = self.clone();
        thread::spawn(move || bus.consume(tx, settle_rx));

        Subscription::with_settlement(rx, settle_tx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamEntry {
    id: String,
    payload: String,
}

fn text(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

/// `[id, [field, value, ...]]`; deleted entries come back as nil and are skipped.
fn parse_entry(value: redis::Value) -> Option<StreamEntry> {
    let redis::Value::Bulk(parts) = value else { return None };
    let [id, redis::Value::Bulk(fields)] = parts.as_slice() else { return None };
    let id = text(id)?;
    let payload = fields
        .chunks(2)
        .find(|pair| pair.len() == 2 && text(&pair[0]).as_deref() == Some("payload"))
        .and_then(|pair| text(&pair[1]))?;
    Some(StreamEntry { id, payload })
}

fn parse_entries(value: redis::Value) -> Vec<StreamEntry> {
    match value {
        redis::Value::Bulk(entries) => entries.into_iter().filter_map(parse_entry).collect(),
        _ => Vec::new(),
    }
}

/// `[[stream, [entry, ...]], ...]`, or nil when BLOCK timed out.
fn parse_read_reply(value: redis::Value, stream_key: &str) -> Vec<StreamEntry> {
    let redis::Value::Bulk(streams) = value else { return Vec::new() };
    streams
        .into_iter()
        .filter_map(|stream| match stream {
            redis::Value::Bulk(mut pair) if pair.len() == 2 => {
                let entries = pair.pop()?;
                (text(&pair[0]).as_deref() == Some(stream_key)).then_some(entries)
            }
            _ => None,
        })
        .flat_map(parse_entries)
        .collect()
}
