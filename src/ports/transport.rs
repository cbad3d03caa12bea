//! Transport port - Interface for the shared bidirectional link.
//!
//! The transport owns the network link and its reconnection policy. Callers
//! only ask for the link to be opened or closed, send channel signals over
//! it, and observe what happens through a broadcast stream of
//! [`TransportEvent`]s.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::domain::booking::BookingEvent;
use crate::domain::foundation::RestaurantId;

/// Whether the link carries the client's credentials (session cookie).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    #[default]
    Include,
    Omit,
}

/// Where and how to open the link.
#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    url: String,
    credentials: CredentialsMode,
    session_cookie: Option<SecretString>,
    auto_connect: bool,
}

impl TransportEndpoint {
    /// Creates an endpoint with credentials included and auto-connect off.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: CredentialsMode::Include,
            session_cookie: None,
            auto_connect: false,
        }
    }

    /// Builds a WebSocket endpoint from an HTTP(S) backend URL.
    ///
    /// `http` maps to `ws`, `https` to `wss`; `ws`/`wss` URLs are kept.
    /// The socket path is appended to the URL.
    pub fn from_backend_url(backend_url: &str, socket_path: &str) -> Result<Self, TransportError> {
        let trimmed = backend_url.trim().trim_end_matches('/');
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("missing scheme: {}", backend_url)))?;

        let ws_scheme = match scheme {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "unsupported scheme: {}",
                    other
                )))
            }
        };
        if rest.is_empty() {
            return Err(TransportError::InvalidEndpoint(format!(
                "missing host: {}",
                backend_url
            )));
        }

        let path = if socket_path.starts_with('/') {
            socket_path.to_string()
        } else {
            format!("/{}", socket_path)
        };

        Ok(Self::new(format!("{}://{}{}", ws_scheme, rest, path)))
    }

    pub fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = mode;
        self
    }

    pub fn with_session_cookie(mut self, cookie: SecretString) -> Self {
        self.session_cookie = Some(cookie);
        self
    }

    /// Forces explicit connection; the link only opens on request.
    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> CredentialsMode {
        self.credentials
    }

    /// Cookie to send, if credentials are included.
    pub fn session_cookie(&self) -> Option<&SecretString> {
        match self.credentials {
            CredentialsMode::Include => self.session_cookie.as_ref(),
            CredentialsMode::Omit => None,
        }
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }
}

/// Channel membership signal sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Join(RestaurantId),
    Leave(RestaurantId),
}

impl ChannelSignal {
    pub fn restaurant_id(&self) -> &RestaurantId {
        match self {
            ChannelSignal::Join(id) | ChannelSignal::Leave(id) => id,
        }
    }
}

/// Something observed on the link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link is live (first connect or after a reconnect).
    Connected,
    /// The link went down.
    Disconnected { reason: String },
    /// The transport is waiting before its next connection attempt.
    Reconnecting { attempt: u32, delay: Duration },
    /// A booking-created event arrived for a joined channel.
    Booking(BookingEvent),
}

/// Errors raised by transport implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection attempt failed: {0}")]
    ConnectFailed(String),

    #[error("Link is not open")]
    NotOpen,

    #[error("Failed to send on link: {0}")]
    Send(String),

    #[error("Transport was closed")]
    Closed,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Port for the shared bidirectional link.
///
/// Implementations must:
/// - Never connect on construction; only `open` connects
/// - Keep at most one underlying link alive at a time
/// - Reconnect on their own after a drop until `close` is called,
///   emitting `Disconnected`, `Reconnecting` and `Connected` events
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the link and waits for the outcome of the first attempt.
    ///
    /// A failed first attempt returns an error but leaves the transport
    /// retrying in the background.
    async fn open(&self, endpoint: &TransportEndpoint) -> Result<(), TransportError>;

    /// Closes the link and stops reconnecting.
    async fn close(&self);

    /// Sends a channel signal over the live link.
    async fn send(&self, signal: ChannelSignal) -> Result<(), TransportError>;

    /// Live link status.
    fn is_open(&self) -> bool;

    /// Subscribes to link events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("is_open", &self.is_open())
            .finish()
    }
}
