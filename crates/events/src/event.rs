use chrono::{DateTime, Utc};

use quitute_core::ItemId;

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - scoped to the **item** whose stock row produced them
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "inventory.item.back_in_stock").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Item the event is about.
    fn item_id(&self) -> ItemId;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
