//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**: two values with the same attributes are
//! the same value. `CustomerEmail` is the main one in this workspace; it is the
//! customer half of the `(customer, item)` key of an interest record.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one. Constructors validate, so a value that exists is valid.
///
/// ```ignore
/// let a = CustomerEmail::parse("ana@padaria.test")?;
/// let b = CustomerEmail::parse("  ANA@padaria.test ")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
