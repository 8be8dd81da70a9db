use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quitute_core::{CustomerEmail, DomainResult, Entity, ItemId, ReservationId};

use crate::item::ensure_positive_quantity;

/// One committed sale in the append-only reservation log.
///
/// Immutable once created; written in the same atomic unit as the stock
/// decrement it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub customer_email: CustomerEmail,
    pub quantity: i64,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// A confirmed reservation for a sale that has passed the stock check.
    pub fn confirmed(
        item_id: ItemId,
        customer_email: CustomerEmail,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_positive_quantity(quantity)?;
        Ok(Self {
            id: ReservationId::new(),
            item_id,
            customer_email,
            quantity,
            confirmed: true,
            created_at,
        })
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
