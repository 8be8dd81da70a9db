//! Domain events and the bus that carries them between independent callers.
//!
//! The only cross-process trigger in this system is "notify interested parties
//! for item X", emitted by Restock and consumed by the notification dispatcher.
//! This crate holds the transport-agnostic mechanics for it.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{BusError, EventBus, Settlement, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
