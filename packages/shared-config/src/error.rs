//! Errors raised while loading or checking client configuration
//!
//! Every variant names the `OCCUPANCY_*` setting at fault so a bad `.env`
//! can be fixed without reading code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required variable absent from the environment
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Variable present but not parseable, or rejected on its face
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// API endpoint without an http(s) scheme or host
    #[error("invalid URL format for {0}: {1}")]
    InvalidUrl(String, String),

    /// A realtime interval or timeout set to zero, which would spin timers
    #[error("{0} must be greater than zero")]
    ZeroDuration(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
