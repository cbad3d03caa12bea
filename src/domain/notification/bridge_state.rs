//! Observable state exposed to dashboard consumers.

use serde::Serialize;

use crate::domain::booking::BookingEvent;

/// What a consumer sees: link liveness and the latest booking for the
/// restaurant it is currently subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeState {
    pub is_connected: bool,
    pub new_booking: Option<BookingEvent>,
}

impl BridgeState {
    /// State of a bridge with no subject, or one that was torn down.
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Outcome of offering a booking event to a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event matched the current subject and replaced `new_booking`.
    Applied,
    /// The event was addressed to a restaurant the bridge no longer
    /// follows and was dropped.
    StaleDiscarded,
    /// The bridge has no subject or was torn down.
    Ignored,
}
