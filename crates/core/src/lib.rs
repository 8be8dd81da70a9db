//! `quitute-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the customer e-mail value object and the domain error model
//! shared by the stock ledger, the interest registry and the services on top.

pub mod email;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use email::CustomerEmail;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ItemId, ReservationId};
pub use value_object::ValueObject;
