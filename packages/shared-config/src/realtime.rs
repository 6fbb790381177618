//! Realtime subscription configuration types

use std::time::Duration;

use crate::{parse_env, ConfigError, ConfigResult};

/// Timing knobs for realtime subscriptions
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between subscription-area expiry extensions, in seconds
    pub extension_interval_secs: u64,

    /// Keepalive interval assumed until the server advertises its own, in seconds
    pub default_keepalive_secs: u64,

    /// How long to wait for `complete` after sending `stop`, in seconds
    pub deregister_timeout_secs: u64,

    /// WebSocket connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl RealtimeConfig {
    /// Load realtime configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            extension_interval_secs: parse_env("OCCUPANCY_EXTENSION_INTERVAL", 240)?,
            default_keepalive_secs: parse_env("OCCUPANCY_DEFAULT_KEEPALIVE", 10)?,
            deregister_timeout_secs: parse_env("OCCUPANCY_DEREGISTER_TIMEOUT", 10)?,
            connect_timeout_secs: parse_env("OCCUPANCY_CONNECT_TIMEOUT", 10)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the extension interval
    pub fn with_extension_interval(mut self, secs: u64) -> Self {
        self.extension_interval_secs = secs;
        self
    }

    /// Override the deregistration timeout
    pub fn with_deregister_timeout(mut self, secs: u64) -> Self {
        self.deregister_timeout_secs = secs;
        self
    }

    /// Reject zero intervals, which would spin timers
    pub fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("OCCUPANCY_EXTENSION_INTERVAL", self.extension_interval_secs),
            ("OCCUPANCY_DEFAULT_KEEPALIVE", self.default_keepalive_secs),
            ("OCCUPANCY_DEREGISTER_TIMEOUT", self.deregister_timeout_secs),
            ("OCCUPANCY_CONNECT_TIMEOUT", self.connect_timeout_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn extension_interval(&self) -> Duration {
        Duration::from_secs(self.extension_interval_secs)
    }

    pub fn default_keepalive(&self) -> Duration {
        Duration::from_secs(self.default_keepalive_secs)
    }

    pub fn deregister_timeout(&self) -> Duration {
        Duration::from_secs(self.deregister_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            extension_interval_secs: 240,
            default_keepalive_secs: 10,
            deregister_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}
