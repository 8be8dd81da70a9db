use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quitute_core::ItemId;
use quitute_events::Event;

/// Event: an item went from unavailable to available during a restock.
///
/// This is the "notify interested parties for item X" trigger. Consumers
/// must not trust `stock_quantity` as current; it is the value at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackInStock {
    pub item_id: ItemId,
    pub item_name: String,
    pub stock_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

impl BackInStock {
    pub const EVENT_TYPE: &'static str = "inventory.item.back_in_stock";
}

impl Event for BackInStock {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn version(&self) -> u32 {
        1
    }

    fn item_id(&self) -> ItemId {
        self.item_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quitute_events::EventEnvelope;

    #[test]
    fn survives_a_json_envelope() {
        let ev = BackInStock {
            item_id: ItemId::try_new(7).unwrap(),
            item_name: "coxinha".into(),
            stock_quantity: 4,
            occurred_at: Utc::now(),
        };
        let env = EventEnvelope::from_typed(&ev).unwrap();
        assert_eq!(env.event_type(), "inventory.item.back_in_stock");
        assert_eq!(env.item_id(), ev.item_id);
        assert_eq!(env.decode::<BackInStock>().unwrap(), ev);
    }
}
