//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events
//! - `EventSubscriber` - Port for subscribing to domain events
//! - `EventHandler` - Handler that processes incoming events
//!
//! ## Realtime Ports
//!
//! - `Transport` - The shared bidirectional link to the notification server
//! - `ChannelListener` - Callback for events routed by a subscription channel

mod channel_listener;
mod event_publisher;
mod event_subscriber;
mod transport;

pub use channel_listener::ChannelListener;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use transport::{
    ChannelSignal, CredentialsMode, Transport, TransportEndpoint, TransportError, TransportEvent,
};
