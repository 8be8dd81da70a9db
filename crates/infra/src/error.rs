//! Service-level error taxonomy surfaced to callers.

use thiserror::Error;

use quitute_core::{DomainError, ItemId};

use crate::messaging::ChannelError;
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Missing or malformed input. Not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("item {0} not found")]
    NotFound(ItemId),

    /// Business-rule rejection; carries the stock level so the caller can react.
    #[error("item {item_id} is out of stock")]
    OutOfStock { item_id: ItemId, stock_quantity: i64 },

    #[error(
        "insufficient stock for item {item_id}: requested {requested}, in stock {stock_quantity}"
    )]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        stock_quantity: i64,
    },

    /// Transient store fault. Nothing was mutated, so the call may be retried.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("messaging channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Stored data broke an invariant. Needs an operator, not a retry.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Infrastructure faults worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::StoreUnavailable(_) | ServiceError::ChannelUnavailable(_)
        )
    }

    /// Short machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::OutOfStock { .. } => "out_of_stock",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::ChannelUnavailable(_) => "channel_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            // Only reachable from input that would push stock past i64::MAX.
            DomainError::InvariantViolation(msg) => Self::Validation(msg),
            DomainError::NotFound(item_id) => Self::NotFound(item_id),
            DomainError::OutOfStock { item_id } => Self::OutOfStock {
                item_id,
                stock_quantity: 0,
            },
            DomainError::InsufficientStock {
                item_id,
                requested,
                on_hand,
            } => Self::InsufficientStock {
                item_id,
                requested,
                stock_quantity: on_hand,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StoreError::Rejected(domain) => domain.into(),
            StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

impl From<ChannelError> for ServiceError {
    fn from(err: ChannelError) -> Self {
        Self::ChannelUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_rejections_carry_stock_level_and_are_terminal() {
        let item_id = ItemId::try_new(7).unwrap();
        let err: ServiceError = StoreError::Rejected(DomainError::InsufficientStock {
            item_id,
            requested: 5,
            on_hand: 2,
        })
        .into();
        assert_eq!(
            err,
            ServiceError::InsufficientStock {
                item_id,
                requested: 5,
                stock_quantity: 2
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn infrastructure_faults_are_retryable() {
        assert!(ServiceError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(ServiceError::from(ChannelError::Unavailable("down".into())).is_retryable());
        assert!(!ServiceError::from(StoreError::Corrupt("bad row".into())).is_retryable());
    }
}
