//! Infrastructure event bus implementations.
//!
//! The bus abstraction lives in `quitute-events` as pure mechanics. This
//! module provides infrastructure-backed implementations so restock triggers
//! can cross process boundaries and survive a worker being down.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsEventBus;
