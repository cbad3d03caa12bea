//! Event bus adapters.
//!
//! Adapters implement the event publishing and subscribing ports:
//!
//! - `InMemoryEventBus` - In-process bus with bounded capture for tests
//! - `RedisBookingRelay` - Feeds booking events from Redis pub/sub onto a bus

mod in_memory;
mod redis_relay;

pub use in_memory::InMemoryEventBus;
pub use redis_relay::RedisBookingRelay;
