//! Panel configuration loaded from environment variables
//!
//! Client settings come from `occupancy-shared-config`; this adds which area
//! the panel shows and how long to wait for a clean shutdown.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use occupancy_shared_config::ClientConfig;

/// Panel configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Client configuration shared with the library
    pub client: ClientConfig,

    /// Zone shown on the panel
    pub zone_id: i64,

    /// Floor inside the zone; the whole zone's levels when unset
    pub floor_number: Option<i64>,

    /// How long to wait for subscriptions to complete on exit, in seconds
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let client = ClientConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            client,

            zone_id: env::var("PANEL_ZONE_ID")
                .context("PANEL_ZONE_ID is not set")?
                .parse()
                .context("Invalid PANEL_ZONE_ID value")?,

            floor_number: env::var("PANEL_FLOOR_NUMBER")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("Invalid PANEL_FLOOR_NUMBER value")?,

            shutdown_grace_secs: env::var("PANEL_SHUTDOWN_GRACE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid PANEL_SHUTDOWN_GRACE value")?,
        })
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [(&str, Option<&str>); 2] = [
        (
            "OCCUPANCY_API_URL",
            Some("https://abc.appsync-api.eu-west-1.amazonaws.com/graphql"),
        ),
        ("OCCUPANCY_AUTH_TOKEN", Some("token")),
    ];

    fn with_vars<F: FnOnce()>(extra: &[(&str, Option<&str>)], f: F) {
        let vars: Vec<_> = BASE.iter().chain(extra.iter()).copied().collect();
        temp_env::with_vars(vars, f);
    }

    #[test]
    fn test_from_env_defaults() {
        with_vars(
            &[
                ("PANEL_ZONE_ID", Some("777")),
                ("PANEL_FLOOR_NUMBER", None),
                ("PANEL_SHUTDOWN_GRACE", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.zone_id, 777);
                assert_eq!(config.floor_number, None);
                assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
                assert_eq!(config.client.realtime.extension_interval_secs, 240);
            },
        );
    }

    #[test]
    fn test_floor_number() {
        with_vars(
            &[("PANEL_ZONE_ID", Some("777")), ("PANEL_FLOOR_NUMBER", Some("0"))],
            || {
                assert_eq!(Config::from_env().unwrap().floor_number, Some(0));
            },
        );
    }

    #[test]
    fn test_missing_zone_fails() {
        with_vars(&[("PANEL_ZONE_ID", None)], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("PANEL_ZONE_ID"));
        });
    }

    #[test]
    fn test_invalid_floor_fails() {
        with_vars(
            &[("PANEL_ZONE_ID", Some("777")), ("PANEL_FLOOR_NUMBER", Some("ground"))],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
