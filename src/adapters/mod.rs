//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - Event bus implementations (in-process, Redis relay)
//! - `transport` - Client link implementations (WebSocket, in-memory)
//! - `websocket` - Server-side rooms, upgrade handler, and event bridge

pub mod events;
pub mod transport;
pub mod websocket;

pub use events::{InMemoryEventBus, RedisBookingRelay};
pub use transport::{InMemoryTransport, ReconnectPolicy, TransportCall, WebSocketTransport};
pub use websocket::{websocket_router, BookingEventBridge, RoomManager, WebSocketState};
