//! Rows with identity: items, reservations and interest records.

/// Something a store keys its rows by.
///
/// Two values with the same `id()` are the same row, whatever their other
/// fields say (e.g. an `Item` before and after a sale).
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
