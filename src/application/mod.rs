//! Application layer - Use cases built on the domain and ports.
//!
//! `notification` holds the client-side lifecycle: the shared connection
//! registry, restaurant channel membership, and the per-consumer bridge.

pub mod notification;

pub use notification::{
    ConnectionHandle, ConnectionRegistry, NotificationBridge, NotificationError,
    SubscriptionChannel,
};
