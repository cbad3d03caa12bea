//! Booking events as seen by the notification subsystem.

mod booking_event;

pub use booking_event::{BookingEvent, BOOKING_AGGREGATE, BOOKING_CREATED};
