//! Event bridge connecting booking events to WebSocket clients.
//!
//! Subscribes to `booking.created` envelopes on the event bus and
//! broadcasts each booking to the room of the restaurant it belongs to.
//!
//! # Event Flow
//!
//! ```text
//! booking.created published
//!          │
//!          ▼
//! ┌────────────────────┐
//! │ BookingEventBridge │
//! │  decodes payload   │
//! └────────────────────┘
//!          │
//!          ▼
//! ┌────────────────────┐
//! │  Broadcast to the  │
//! │  restaurant's room │
//! └────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::booking::{BookingEvent, BOOKING_CREATED};
use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::{EventHandler, EventSubscriber};

use super::rooms::RoomManager;

/// Event types pushed to connected clients.
pub const BOOKING_EVENT_TYPES: &[&str] = &[BOOKING_CREATED];

/// Bridge between the event bus and WebSocket rooms.
pub struct BookingEventBridge {
    room_manager: Arc<RoomManager>,
}

impl BookingEventBridge {
    pub fn new(room_manager: Arc<RoomManager>) -> Self {
        Self { room_manager }
    }

    /// Create as an Arc (for sharing with event subscriber).
    pub fn new_shared(room_manager: Arc<RoomManager>) -> Arc<Self> {
        Arc::new(Self::new(room_manager))
    }

    /// Register this bridge with an event subscriber.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let bridge = BookingEventBridge::new_shared(room_manager);
    /// bridge.register(&event_bus);
    /// ```
    pub fn register(self: &Arc<Self>, subscriber: &impl EventSubscriber) {
        subscriber.subscribe_all(BOOKING_EVENT_TYPES, self.clone());
    }
}

#[async_trait]
impl EventHandler for BookingEventBridge {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        let booking = match BookingEvent::from_envelope(&event) {
            None => return Ok(()),
            Some(Ok(booking)) => booking,
            Some(Err(e)) => {
                // Malformed producer payloads are dropped, not retried.
                tracing::warn!(
                    event_id = %event.event_id,
                    aggregate_id = %event.aggregate_id,
                    error = %e,
                    "Skipping malformed booking event"
                );
                return Ok(());
            }
        };

        let reached = self
            .room_manager
            .broadcast_to_restaurant(&booking.restaurant_id, booking.clone())
            .await;

        tracing::debug!(
            booking_id = %booking.booking_id,
            restaurant_id = %booking.restaurant_id,
            clients = reached,
            "Booking broadcast"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "BookingEventBridge"
    }
}
