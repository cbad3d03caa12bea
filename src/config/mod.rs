//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `BOOKING_LIVE` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use booking_live::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod error;
mod realtime;
mod redis;
mod server;

pub use error::{ConfigError, ValidationError};
pub use realtime::{RealtimeConfig, PUBLIC_BACKEND_URL};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime link configuration (endpoint, credentials, reconnect)
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Redis relay configuration; the relay is disabled when absent
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BOOKING_LIVE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BOOKING_LIVE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BOOKING_LIVE__REALTIME__BACKEND_URL=...` -> `realtime.backend_url = ...`
    /// - `BOOKING_LIVE__REDIS__URL=...` -> enables the Redis relay
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BOOKING_LIVE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.realtime.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "BOOKING_LIVE__SERVER__PORT",
        "BOOKING_LIVE__SERVER__ENVIRONMENT",
        "BOOKING_LIVE__REALTIME__BACKEND_URL",
        "BOOKING_LIVE__REALTIME__RECONNECT_MAX_ATTEMPTS",
        "BOOKING_LIVE__REDIS__URL",
        PUBLIC_BACKEND_URL,
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn load_with(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        clear_env();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_defaults_without_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.realtime.socket_path, "/ws");
        assert!(config.redis.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_realtime_backend_url_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[(
            "BOOKING_LIVE__REALTIME__BACKEND_URL",
            "https://bookings.example.com",
        )])
        .unwrap();

        assert_eq!(
            config.realtime.endpoint().unwrap().url(),
            "wss://bookings.example.com/ws"
        );
    }

    #[test]
    fn test_public_backend_url_is_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[(PUBLIC_BACKEND_URL, "http://backend:9000")]).unwrap();

        assert_eq!(config.realtime.backend_url, "http://backend:9000");
    }

    #[test]
    fn test_redis_section_enables_relay() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("BOOKING_LIVE__REDIS__URL", "redis://localhost:6379")]).unwrap();

        let redis = config.redis.as_ref().unwrap();
        assert_eq!(redis.url, "redis://localhost:6379");
        assert_eq!(redis.channel, "bookings.created");
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("BOOKING_LIVE__SERVER__ENVIRONMENT", "production")]).unwrap();

        assert!(config.is_production());
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("BOOKING_LIVE__SERVER__PORT", "3000")]).unwrap();

        assert_eq!(config.server.port, 3000);
    }
}
