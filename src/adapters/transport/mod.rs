//! Transport adapters - Implementations of the `Transport` port.
//!
//! - `WebSocketTransport` - Reconnecting WebSocket client (production)
//! - `InMemoryTransport` - Recording double (testing)

mod backoff;
mod in_memory;
mod websocket;

pub use backoff::ReconnectPolicy;
pub use in_memory::{InMemoryTransport, TransportCall};
pub use websocket::WebSocketTransport;
