//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid backend URL: {0}")]
    InvalidBackendUrl(String),

    #[error("Socket path must start with '/'")]
    InvalidSocketPath,

    #[error("Reconnect delays must be positive and initial <= max")]
    InvalidReconnectDelay,

    #[error("Room capacity must be between 1 and 65536")]
    InvalidRoomCapacity,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis channel name must not be empty")]
    InvalidRedisChannel,
}
