//! Errors raised by the connection registry and subscription channel.

use thiserror::Error;

use crate::ports::TransportError;

/// Failures of registry and channel operations.
///
/// The notification bridge never surfaces these to its consumer; it logs
/// them and degrades to `is_connected = false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// An operation ran before any connection handle was acquired.
    #[error("Connection handle not initialized; acquire it before connecting")]
    NotInitialized,

    /// The link failed. The transport keeps retrying on its own.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
