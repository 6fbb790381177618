//! Error types for the occupancy client

use occupancy_graphql_client::GraphqlError;
use occupancy_shared_config::ConfigError;
use thiserror::Error;

/// Errors surfaced by the occupancy client
#[derive(Error, Debug)]
pub enum OccupancyError {
    /// Filter combination rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server rejected a request or sent a protocol-level error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket or HTTP transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// An operation or keepalive timed out
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Granularity not one of Zone, Level, Group, Position
    #[error("Unsupported granularity: {0}")]
    UnsupportedGranularity(String),

    /// Registry invariant violated (duplicate handle or subscription id)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Response could not be mapped onto the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The client was shut down; it cannot open new connections
    #[error("Client is shut down")]
    ShutDown,
}

impl From<GraphqlError> for OccupancyError {
    fn from(err: GraphqlError) -> Self {
        match &err {
            GraphqlError::Graphql(_) => OccupancyError::Protocol(err.to_string()),
            GraphqlError::Timeout(_) => OccupancyError::Timeout(err.to_string()),
            GraphqlError::Json(_) | GraphqlError::InvalidResponse(_) => {
                OccupancyError::InvalidResponse(err.to_string())
            }
            GraphqlError::Status { status, .. } if (400..500).contains(status) => {
                OccupancyError::Protocol(err.to_string())
            }
            GraphqlError::Http(_)
            | GraphqlError::Status { .. }
            | GraphqlError::MissingAuthToken
            | GraphqlError::RetriesExhausted { .. } => OccupancyError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OccupancyError {
    fn from(err: serde_json::Error) -> Self {
        OccupancyError::InvalidResponse(err.to_string())
    }
}

/// Result type for occupancy operations
pub type OccupancyResult<T> = Result<T, OccupancyError>;
