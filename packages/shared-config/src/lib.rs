//! Shared configuration types for the occupancy subscription client
//!
//! Both the client library and the panel binary load their settings through
//! these types so environment variable names stay in one place.

mod api;
mod error;
mod realtime;

pub use api::ApiConfig;
pub use error::{ConfigError, ConfigResult};
pub use realtime::RealtimeConfig;

use std::env;

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// GraphQL endpoint and credentials
    pub api: ApiConfig,

    /// Realtime timing settings
    pub realtime: RealtimeConfig,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            api: ApiConfig::from_env()?,
            realtime: RealtimeConfig::from_env()?,
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Load a `.env` file when present, then read the environment
    pub fn load() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build a configuration from an API config and default realtime settings
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            realtime: RealtimeConfig::default(),
            log_level: "info".to_string(),
        }
    }

    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
