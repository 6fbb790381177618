//! Control-plane API configuration types

use crate::{get_required_env, parse_env, ConfigError, ConfigResult};
use std::env;

/// Host segment used by the managed GraphQL HTTP endpoint
const HTTP_HOST_MARKER: &str = "appsync-api";

/// Host segment used by the matching realtime endpoint
const REALTIME_HOST_MARKER: &str = "appsync-realtime-api";

/// GraphQL API endpoint and credentials
#[derive(Clone)]
pub struct ApiConfig {
    /// HTTP GraphQL endpoint (e.g., https://xyz.appsync-api.eu-west-1.amazonaws.com/graphql)
    pub url: String,

    /// API key / bearer token, sent verbatim in the `Authorization` header
    pub auth_token: String,

    /// Explicit realtime endpoint, overrides the one derived from `url`
    pub realtime_url_override: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts for transient HTTP failures
    pub max_retries: u32,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("auth_token", &"[REDACTED]")
            .field("realtime_url_override", &self.realtime_url_override)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ApiConfig {
    /// Load API configuration from environment variables
    ///
    /// `OCCUPANCY_API_URL` and `OCCUPANCY_AUTH_TOKEN` are required.
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_required_env("OCCUPANCY_API_URL")?;
        let auth_token = get_required_env("OCCUPANCY_AUTH_TOKEN")?;

        if auth_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "OCCUPANCY_AUTH_TOKEN".to_string(),
                "token cannot be empty".to_string(),
            ));
        }

        let config = Self {
            url,
            auth_token,
            realtime_url_override: env::var("OCCUPANCY_REALTIME_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout_secs: parse_env("OCCUPANCY_HTTP_TIMEOUT", 60)?,
            max_retries: parse_env("OCCUPANCY_HTTP_MAX_RETRIES", 3)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with custom URL and token (useful for testing)
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            realtime_url_override: None,
            timeout_secs: 60,
            max_retries: 3,
        }
    }

    /// Point the realtime connection at an explicit endpoint
    pub fn with_realtime_url(mut self, realtime_url: impl Into<String>) -> Self {
        self.realtime_url_override = Some(realtime_url.into());
        self
    }

    /// Check that the URL carries an http(s) scheme and a host
    pub fn validate(&self) -> ConfigResult<()> {
        let scheme_ok = self.url.starts_with("https://") || self.url.starts_with("http://");
        if !scheme_ok || self.host().is_empty() {
            return Err(ConfigError::InvalidUrl(
                "OCCUPANCY_API_URL".to_string(),
                self.url.clone(),
            ));
        }
        Ok(())
    }

    /// Host (and port, when present) of the HTTP endpoint
    ///
    /// This is the `host` value of the realtime handshake header.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme
            .split(['/', '?'])
            .next()
            .unwrap_or(without_scheme)
    }

    /// Realtime WebSocket endpoint
    ///
    /// Uses the override when configured; otherwise swaps the scheme for its
    /// WebSocket counterpart and the API host segment for the realtime one.
    pub fn realtime_url(&self) -> String {
        if let Some(url) = &self.realtime_url_override {
            return url.clone();
        }

        let swapped = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.url.clone()
        };
        swapped.replacen(HTTP_HOST_MARKER, REALTIME_HOST_MARKER, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPSYNC_URL: &str =
        "https://abc123.appsync-api.eu-west-1.amazonaws.com/graphql";

    #[test]
    fn test_new_config() {
        let config = ApiConfig::new(APPSYNC_URL, "token");
        assert_eq!(config.url, APPSYNC_URL);
        assert_eq!(config.auth_token, "token");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_retries, 3);
        assert!(config.realtime_url_override.is_none());
    }

    #[test]
    fn test_host() {
        let config = ApiConfig::new(APPSYNC_URL, "token");
        assert_eq!(config.host(), "abc123.appsync-api.eu-west-1.amazonaws.com");

        let local = ApiConfig::new("http://127.0.0.1:8080/graphql", "token");
        assert_eq!(local.host(), "127.0.0.1:8080");
    }

    #[test]
    fn test_realtime_url_derivation() {
        let config = ApiConfig::new(APPSYNC_URL, "token");
        assert_eq!(
            config.realtime_url(),
            "wss://abc123.appsync-realtime-api.eu-west-1.amazonaws.com/graphql"
        );
    }

    #[test]
    fn test_realtime_url_plain_http() {
        let config = ApiConfig::new("http://localhost:4000/graphql", "token");
        assert_eq!(config.realtime_url(), "ws://localhost:4000/graphql");
    }

    #[test]
    fn test_realtime_url_override() {
        let config =
            ApiConfig::new(APPSYNC_URL, "token").with_realtime_url("ws://127.0.0.1:9000/");
        assert_eq!(config.realtime_url(), "ws://127.0.0.1:9000/");
    }

    #[test]
    fn test_validate_rejects_missing_scheme() {
        let config = ApiConfig::new("abc123.appsync-api.example.com/graphql", "token");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_, _))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ApiConfig::new(APPSYNC_URL, "secret-token");
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret-token"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_env_requires_token() {
        temp_env::with_vars(
            [
                ("OCCUPANCY_API_URL", Some(APPSYNC_URL)),
                ("OCCUPANCY_AUTH_TOKEN", None),
            ],
            || {
                let result = ApiConfig::from_env();
                assert!(matches!(result, Err(ConfigError::MissingEnvVar(name)) if name == "OCCUPANCY_AUTH_TOKEN"));
            },
        );
    }

    #[test]
    fn test_from_env_reads_overrides() {
        temp_env::with_vars(
            [
                ("OCCUPANCY_API_URL", Some(APPSYNC_URL)),
                ("OCCUPANCY_AUTH_TOKEN", Some("da2-token")),
                ("OCCUPANCY_REALTIME_URL", Some("ws://localhost:9999")),
                ("OCCUPANCY_HTTP_TIMEOUT", Some("15")),
                ("OCCUPANCY_HTTP_MAX_RETRIES", None),
            ],
            || {
                let config = ApiConfig::from_env().unwrap();
                assert_eq!(config.auth_token, "da2-token");
                assert_eq!(config.timeout_secs, 15);
                assert_eq!(config.max_retries, 3);
                assert_eq!(config.realtime_url(), "ws://localhost:9999");
            },
        );
    }
}
