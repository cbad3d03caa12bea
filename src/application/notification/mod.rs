//! Client-side booking notifications.
//!
//! ```text
//!   NotificationBridge (one per dashboard)
//!          │ attach / release
//!          ▼
//!   ConnectionRegistry ── one ConnectionHandle ── Transport
//!                                 │
//!                                 ▼
//!                       SubscriptionChannel (join / leave / listeners)
//! ```

mod connection_registry;
mod errors;
mod notification_bridge;
mod subscription_channel;

pub use connection_registry::{ConnectionHandle, ConnectionRegistry};
pub use errors::NotificationError;
pub use notification_bridge::NotificationBridge;
pub use subscription_channel::SubscriptionChannel;
