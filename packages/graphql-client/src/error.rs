//! Error types for the GraphQL client

use thiserror::Error;

use crate::models::GraphqlErrorEntry;

/// Errors that can occur when executing GraphQL documents
#[derive(Error, Debug)]
pub enum GraphqlError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize/deserialize JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a GraphQL `errors` array
    #[error("GraphQL errors: {}", format_entries(.0))]
    Graphql(Vec<GraphqlErrorEntry>),

    /// Non-success HTTP status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Response had neither `data` nor `errors`
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Token missing or empty
    #[error("Authorization token is missing")]
    MissingAuthToken,

    /// All retry attempts exhausted
    #[error("All {attempts} retry attempts failed. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl GraphqlError {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphqlError::Timeout(_) | GraphqlError::Http(_) => true,
            GraphqlError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

fn format_entries(entries: &[GraphqlErrorEntry]) -> String {
    entries
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for GraphQL operations
pub type GraphqlResult<T> = Result<T, GraphqlError>;
