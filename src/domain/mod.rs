//! Domain layer containing the notification domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, events)
//! - `booking` - Booking-created event payload and envelope mapping
//! - `notification` - Bridge lifecycle status and consumer-visible state

pub mod booking;
pub mod foundation;
pub mod notification;
