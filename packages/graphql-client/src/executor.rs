//! Query executor capability

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GraphqlResult;

/// Executes a GraphQL document with variable bindings
///
/// Returns the `data` object of the response. Implemented by
/// [`GraphqlClient`](crate::GraphqlClient); tests supply their own.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, document: &str, variables: Value) -> GraphqlResult<Value>;
}
