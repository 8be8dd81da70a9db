use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quitute_core::{CustomerEmail, DomainResult, ItemId};

use crate::item::ensure_positive_quantity;

/// Default number of units a customer is waiting for.
pub const DEFAULT_DESIRED_QUANTITY: i64 = 1;

/// Unique key of the interest registry: at most one record per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterestKey {
    pub customer_email: CustomerEmail,
    pub item_id: ItemId,
}

/// A customer waiting to hear that an item is back in stock.
///
/// `notified` only moves `false → true` through [`InterestRecord::mark_notified`]
/// (called by the dispatcher after a send succeeded) and back to `false`
/// through [`InterestRecord::rearm`] (the customer asked again).
///
/// `revision` counts re-registrations. A send is recorded against the
/// revision it was made for, so a customer who asks again while a message is
/// in flight stays armed for the next restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRecord {
    pub customer_email: CustomerEmail,
    pub item_id: ItemId,
    pub desired_quantity: i64,
    pub notified: bool,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

impl InterestRecord {
    pub fn new(
        customer_email: CustomerEmail,
        item_id: ItemId,
        desired_quantity: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let desired_quantity = desired_quantity.unwrap_or(DEFAULT_DESIRED_QUANTITY);
        ensure_positive_quantity(desired_quantity)?;
        Ok(Self {
            customer_email,
            item_id,
            desired_quantity,
            notified: false,
            revision: 0,
            created_at,
        })
    }

    pub fn key(&self) -> InterestKey {
        InterestKey {
            customer_email: self.customer_email.clone(),
            item_id: self.item_id,
        }
    }

    /// Waiting for a notification that has not been sent yet.
    pub fn is_pending(&self) -> bool {
        !self.notified
    }

    /// Re-register interest: always re-arms the notification.
    ///
    /// `desired_quantity = None` keeps whatever the customer asked for before.
    pub fn rearm(&mut self, desired_quantity: Option<i64>) -> DomainResult<()> {
        if let Some(q) = desired_quantity {
            ensure_positive_quantity(q)?;
            self.desired_quantity = q;
        }
        self.notified = false;
        self.revision += 1;
        Ok(())
    }

    /// Record a successful send made for `sent_for_revision`.
    ///
    /// Returns `false` (and changes nothing) if the record was already
    /// notified or has been re-armed since that revision was read.
    pub fn mark_notified(&mut self, sent_for_revision: i64) -> bool {
        if self.notified || self.revision != sent_for_revision {
            return false;
        }
        self.notified = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(desired: Option<i64>) -> InterestRecord {
        InterestRecord::new(
            CustomerEmail::parse("ana@padaria.test").unwrap(),
            ItemId::try_new(7).unwrap(),
            desired,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn defaults_to_one_unit_and_pending() {
        let r = record(None);
        assert_eq!(r.desired_quantity, 1);
        assert!(r.is_pending());
    }

    #[test]
    fn rejects_non_positive_desired_quantity() {
        let res = InterestRecord::new(
            CustomerEmail::parse("ana@padaria.test").unwrap(),
            ItemId::try_new(7).unwrap(),
            Some(0),
            Utc::now(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn mark_notified_is_one_way_until_rearmed() {
        let mut r = record(None);
        assert!(r.mark_notified(0));
        assert!(!r.mark_notified(0));
        assert!(!r.is_pending());

        r.rearm(None).unwrap();
        assert!(r.is_pending());
        assert!(r.mark_notified(1));
    }

    #[test]
    fn send_for_an_older_revision_does_not_disarm() {
        let mut r = record(None);
        let seen = r.revision;

        // The customer asks again while the message is in flight.
        r.rearm(None).unwrap();

        assert!(!r.mark_notified(seen));
        assert!(r.is_pending());
        assert!(r.mark_notified(r.revision));
    }

    #[test]
    fn rearm_keeps_desired_quantity_unless_given() {
        let mut r = record(Some(3));
        r.rearm(None).unwrap();
        assert_eq!(r.desired_quantity, 3);
        r.rearm(Some(5)).unwrap();
        assert_eq!(r.desired_quantity, 5);
    }
}
