//! Infrastructure layer: stores, messaging, services and background work.
//!
//! ```text
//! HTTP ─► SaleService / AvailabilityService ─► store (row-locked)
//! HTTP / simulator ─► RestockService ─► store ─► EventBus ─► NotificationWorker
//!                                                             └► NotificationDispatcher ─► MessageChannel
//! ```

pub mod error;
pub mod event_bus;
pub mod messaging;
pub mod retry;
pub mod services;
pub mod simulator;
pub mod store;
pub mod worker;

pub use error::ServiceError;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use simulator::{SimulationOutcome, SimulatorConfig, SupplierSimulator};
pub use worker::{NotificationWorker, WorkerHandle};
