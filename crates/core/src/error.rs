//! Domain error model.

use thiserror::Error;

use crate::id::ItemId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock rules, invariants). Infrastructure concerns belong elsewhere.
/// None of these are worth retrying: the same input against the same stock
/// yields the same answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced item does not exist.
    #[error("item {0} not found")]
    NotFound(ItemId),

    /// The item has no stock at all (or is flagged unavailable).
    #[error("item {item_id} is out of stock")]
    OutOfStock { item_id: ItemId },

    /// The item has stock, but less than requested.
    #[error("insufficient stock for item {item_id}: requested {requested}, on hand {on_hand}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        on_hand: i64,
    },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(item_id: ItemId) -> Self {
        Self::NotFound(item_id)
    }

    /// Stock-rule rejections (as opposed to malformed input).
    pub fn is_stock_rejection(&self) -> bool {
        matches!(
            self,
            DomainError::OutOfStock { .. } | DomainError::InsufficientStock { .. }
        )
    }
}
