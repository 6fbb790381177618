//! GraphQL over HTTP client for the occupancy control plane
//!
//! Posts `{"query", "variables"}` envelopes to the configured endpoint and
//! returns the `data` object, surfacing `errors` as [`GraphqlError::Graphql`].
//!
//! # Example
//!
//! ```no_run
//! use occupancy_graphql_client::GraphqlClient;
//! use occupancy_shared_config::ApiConfig;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApiConfig::new("https://example.appsync-api.eu-west-1.amazonaws.com/graphql", "token");
//! let client = GraphqlClient::new(&config)?;
//! let data = client.execute("query { __typename }", json!({})).await?;
//! println!("{}", data);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod executor;
mod models;

pub use client::GraphqlClient;
pub use error::{GraphqlError, GraphqlResult};
pub use executor::QueryExecutor;
pub use models::{GraphqlErrorEntry, GraphqlRequest, GraphqlResponse};
