//! ChannelListener port - Callback for events routed by a subscription channel.

use crate::ports::TransportEvent;

/// Receives link status changes and bookings for the listener's channel.
///
/// Called from the channel's dispatch loop, so implementations must be
/// quick and must not block. Status events (`Connected`, `Disconnected`,
/// `Reconnecting`) go to every listener; `Booking` events only to listeners
/// whose consumer is a member of the event's restaurant.
pub trait ChannelListener: Send + Sync {
    /// Handle one routed event.
    fn on_event(&self, event: &TransportEvent);

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}
