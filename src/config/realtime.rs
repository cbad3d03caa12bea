//! Realtime (client link) configuration

use serde::Deserialize;
use std::time::Duration;

use secrecy::SecretString;

use crate::adapters::transport::ReconnectPolicy;
use crate::ports::{CredentialsMode, TransportEndpoint};

use super::error::ValidationError;

/// Fallback variable shared with the web frontend.
pub const PUBLIC_BACKEND_URL: &str = "PUBLIC_BACKEND_URL";

/// Realtime link configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// HTTP(S) base URL of the notification server
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// WebSocket path on the backend
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Send the session cookie on the upgrade request
    #[serde(default = "default_with_credentials")]
    pub with_credentials: bool,

    /// Session cookie (`name=value`) to present
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Give up after this many attempts (unset = retry forever)
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,

    /// Bookings each connected client may have queued on the server
    /// before further ones are dropped for that client
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

impl RealtimeConfig {
    /// Endpoint for the shared link.
    pub fn endpoint(&self) -> Result<TransportEndpoint, ValidationError> {
        let endpoint = TransportEndpoint::from_backend_url(&self.backend_url, &self.socket_path)
            .map_err(|e| ValidationError::InvalidBackendUrl(e.to_string()))?;

        let credentials = if self.with_credentials {
            CredentialsMode::Include
        } else {
            CredentialsMode::Omit
        };
        let endpoint = endpoint.with_credentials(credentials);

        Ok(match &self.session_cookie {
            Some(cookie) => endpoint.with_session_cookie(SecretString::new(cookie.clone())),
            None => endpoint,
        })
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::default()
            .with_initial_delay(Duration::from_millis(self.reconnect_initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.reconnect_max_delay_ms))
            .with_max_attempts(self.reconnect_max_attempts)
    }

    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backend_url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("REALTIME__BACKEND_URL"));
        }
        if !self.socket_path.starts_with('/') {
            return Err(ValidationError::InvalidSocketPath);
        }
        if self.reconnect_initial_delay_ms == 0
            || self.reconnect_initial_delay_ms > self.reconnect_max_delay_ms
        {
            return Err(ValidationError::InvalidReconnectDelay);
        }
        if self.room_capacity == 0 || self.room_capacity > 65_536 {
            return Err(ValidationError::InvalidRoomCapacity);
        }
        self.endpoint()?;
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            socket_path: default_socket_path(),
            with_credentials: default_with_credentials(),
            session_cookie: None,
            reconnect_initial_delay_ms: default_initial_delay_ms(),
            reconnect_max_delay_ms: default_max_delay_ms(),
            reconnect_max_attempts: None,
            room_capacity: default_room_capacity(),
        }
    }
}

fn default_backend_url() -> String {
    std::env::var(PUBLIC_BACKEND_URL).unwrap_or_else(|_| "http://localhost:8080".to_string())
}

fn default_socket_path() -> String {
    "/ws".to_string()
}

fn default_with_credentials() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_room_capacity() -> usize {
    128
}
