//! WebSocket adapters for real-time booking notifications.
//!
//! This module provides the server side of the notification link: it
//! pushes booking events to connected dashboards over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Event Bus                                    │
//! │   InMemoryEventBus  ◄──  RedisBookingRelay (cross-process)          │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ subscribes
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    BookingEventBridge                                │
//! │   - Subscribes to booking.created                                   │
//! │   - Decodes EventEnvelope → BookingEvent                            │
//! │   - Routes to the restaurant's room                                 │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     │ broadcasts
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      RoomManager                                     │
//! │   Room: rest-1         Room: rest-2         Room: rest-3            │
//! │   ├── client-a         ├── client-d         └── client-g            │
//! │   └── client-b         └── client-e                                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types (shared with the client transport)
//! - [`rooms`] - Room management for restaurant-based routing
//! - [`handler`] - Axum WebSocket upgrade handler
//! - [`event_bridge`] - Bridge between event bus and WebSocket rooms

pub mod event_bridge;
pub mod handler;
pub mod messages;
pub mod rooms;

pub use event_bridge::{BookingEventBridge, BOOKING_EVENT_TYPES};
pub use handler::{websocket_router, ws_handler, WebSocketState};
pub use messages::{
    ClientMessage, ConnectedMessage, ErrorMessage, PongMessage, RoomMessage, ServerMessage,
};
pub use rooms::{ClientId, RoomManager};
