//! WebSocket message types for real-time booking notifications.
//!
//! Defines the protocol between server and connected clients:
//! - Server → Client: Connection status, room acknowledgements, booking
//!   events, errors, pongs
//! - Client → Server: Room join/leave, pings

use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingEvent;
use crate::domain::foundation::{RestaurantId, Timestamp};
use crate::ports::ChannelSignal;

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established successfully.
    Connected(ConnectedMessage),

    /// A booking was created for the client's restaurant.
    #[serde(rename = "booking.created")]
    BookingCreated(BookingEvent),

    /// Client joined a restaurant room.
    Joined(RoomMessage),

    /// Client left a restaurant room.
    Left(RoomMessage),

    /// Error occurred.
    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

impl ServerMessage {
    pub fn connected(client_id: impl Into<String>) -> Self {
        ServerMessage::Connected(ConnectedMessage {
            client_id: client_id.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: code.into(),
            message: message.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn pong() -> Self {
        ServerMessage::Pong(PongMessage {
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }
}

/// Sent when a client's socket is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub client_id: String,
    pub timestamp: String,
}

/// Names a restaurant room. Used in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub restaurant_id: RestaurantId,
}

/// Error message sent to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

/// Heartbeat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMessage {
    pub timestamp: String,
}

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a restaurant's room. A connection may be in several rooms.
    Join(RoomMessage),

    /// Leave a restaurant's room.
    Leave(RoomMessage),

    /// Heartbeat request.
    Ping,
}

impl From<ChannelSignal> for ClientMessage {
    fn from(signal: ChannelSignal) -> Self {
        match signal {
            ChannelSignal::Join(restaurant_id) => ClientMessage::Join(RoomMessage { restaurant_id }),
            ChannelSignal::Leave(restaurant_id) => {
                ClientMessage::Leave(RoomMessage { restaurant_id })
            }
        }
    }
}
