//! GraphQL HTTP client with retry logic and connection pooling

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use occupancy_shared_config::ApiConfig;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GraphqlError, GraphqlResult};
use crate::executor::QueryExecutor;
use crate::models::{GraphqlRequest, GraphqlResponse};

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// GraphQL API client
///
/// Sends the configured token verbatim in the `Authorization` header.
#[derive(Clone)]
pub struct GraphqlClient {
    http_client: Client,
    config: ApiConfig,
    retry_attempts: u32,
    retry_base_delay_ms: u64,
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("url", &self.config.url)
            .field("auth_token", &"[REDACTED]")
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

impl GraphqlClient {
    /// Create a new client from configuration
    pub fn new(config: &ApiConfig) -> GraphqlResult<Self> {
        if config.auth_token.trim().is_empty() {
            return Err(GraphqlError::MissingAuthToken);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self::with_client(config, http_client))
    }

    /// Create a client with custom HTTP client (for testing)
    pub fn with_client(config: &ApiConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            retry_attempts: config.max_retries,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, attempts: u32, base_delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Execute an async operation with retry logic
    async fn with_retry<T, F, Fut>(&self, operation: F) -> GraphqlResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GraphqlResult<T>>,
    {
        if self.retry_attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < self.retry_attempts {
                        let delay = self.retry_base_delay_ms * 2_u64.pow(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.retry_attempts,
                            delay_ms = delay,
                            error = %e,
                            "Retrying GraphQL request after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(GraphqlError::RetriesExhausted {
            attempts: self.retry_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Truncate error body on a UTF-8 boundary
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    /// Single request, no retry
    async fn execute_once(&self, document: &str, variables: &Value) -> GraphqlResult<Value> {
        let request = GraphqlRequest {
            query: document,
            variables,
        };

        let response = self
            .http_client
            .post(&self.config.url)
            .header("Authorization", &self.config.auth_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraphqlError::Timeout(self.config.timeout_secs)
                } else {
                    GraphqlError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = Self::truncate_error_body(response.text().await.unwrap_or_default());
            return Err(GraphqlError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GraphqlResponse = response.json().await?;

        match (body.data, body.errors) {
            (_, Some(errors)) if !errors.is_empty() => Err(GraphqlError::Graphql(errors)),
            (Some(data), _) if !data.is_null() => Ok(data),
            _ => Err(GraphqlError::InvalidResponse(
                "response carried neither data nor errors".to_string(),
            )),
        }
    }

    /// Execute a query or mutation document with retry logic
    pub async fn execute(&self, document: &str, variables: Value) -> GraphqlResult<Value> {
        debug!(
            document_len = document.len(),
            variables = %variables,
            "Executing GraphQL document"
        );

        let data = self
            .with_retry(|| self.execute_once(document, &variables))
            .await?;

        debug!("GraphQL document executed");
        Ok(data)
    }
}

#[async_trait]
impl QueryExecutor for GraphqlClient {
    async fn execute(&self, document: &str, variables: Value) -> GraphqlResult<Value> {
        GraphqlClient::execute(self, document, variables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: &str) -> ApiConfig {
        ApiConfig::new(format!("{}/graphql", server_url), "test-token")
    }

    #[test]
    fn test_client_creation() {
        let config = ApiConfig::new("https://example.appsync-api.test/graphql", "token");
        assert!(GraphqlClient::new(&config).is_ok());
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = ApiConfig::new("https://example.appsync-api.test/graphql", "  ");
        assert_matches!(GraphqlClient::new(&config), Err(GraphqlError::MissingAuthToken));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ApiConfig::new("https://example.appsync-api.test/graphql", "secret");
        let client = GraphqlClient::new(&config).unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_truncate_error_body() {
        let short = "short error".to_string();
        assert_eq!(GraphqlClient::truncate_error_body(short.clone()), short);

        let long = "日".repeat(500);
        let truncated = GraphqlClient::truncate_error_body(long);
        assert!(truncated.ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn test_execute_sends_token_and_returns_data() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("Authorization", "test-token"))
            .and(body_partial_json(json!({"variables": {"id": 5}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"updateSubscriptionArea": {"id": "5"}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphqlClient::new(&test_config(&server.uri())).unwrap();
        let data = client
            .execute("mutation { x }", json!({"id": 5}))
            .await
            .unwrap();

        assert_eq!(data["updateSubscriptionArea"]["id"], "5");
    }

    #[tokio::test]
    async fn test_execute_graphql_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": "Validation error of type FieldUndefined"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphqlClient::new(&test_config(&server.uri())).unwrap();
        let result = client.execute("query { nope }", json!({})).await;

        assert_matches!(result, Err(GraphqlError::Graphql(entries)) if entries.len() == 1);
    }

    #[tokio::test]
    async fn test_execute_retries_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(2)
            .mount(&server)
            .await;

        let client = GraphqlClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_retry_config(2, 1);
        let result = client.execute("query { x }", json!({})).await;

        assert_matches!(result, Err(GraphqlError::RetriesExhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_execute_does_not_retry_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("UnauthorizedException"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphqlClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_retry_config(3, 1);
        let result = client.execute("query { x }", json!({})).await;

        assert_matches!(result, Err(GraphqlError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_execute_missing_data() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = GraphqlClient::new(&test_config(&server.uri())).unwrap();
        let result = client.execute("query { x }", json!({})).await;

        assert_matches!(result, Err(GraphqlError::InvalidResponse(_)));
    }
}
