//! Request and response envelopes for GraphQL over HTTP

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a GraphQL POST request
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest<'a> {
    /// Query or mutation document
    pub query: &'a str,
    /// Variable bindings
    pub variables: &'a Value,
}

/// Body of a GraphQL response
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlErrorEntry>>,
}

/// One entry of the `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlErrorEntry {
    pub message: String,
    #[serde(default, rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
}

impl GraphqlErrorEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            path: None,
        }
    }
}
