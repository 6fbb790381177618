//! Mock GraphQL control plane
//!
//! Provides a [`MockControlPlane`] that answers the subscription-area
//! mutations and the group occupancy query on `POST /graphql`.

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRAPHQL_PATH: &str = "/graphql";

/// Mock control-plane server for testing
///
/// # Example
///
/// ```rust,ignore
/// use occupancy_test_utils::MockControlPlane;
///
/// #[tokio::test]
/// async fn test_create() {
///     let server = MockControlPlane::start().await;
///     server.mock_create_area(31, "Zone").await;
///
///     // Point ApiConfig at server.url()
/// }
/// ```
pub struct MockControlPlane {
    server: MockServer,
}

impl MockControlPlane {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// GraphQL endpoint URL
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), GRAPHQL_PATH)
    }

    /// Answer `createSubscriptionArea` with area `id`
    pub async fn mock_create_area(&self, id: i64, granularity: &str) {
        self.mount_data(
            "createSubscriptionArea",
            json!({ "createSubscriptionArea": area_fixture(id, granularity) }),
        )
        .await;
    }

    /// Answer `updateSubscriptionArea` (and therefore extensions) with area `id`
    pub async fn mock_update_area(&self, id: i64, granularity: &str) {
        self.mount_data(
            "updateSubscriptionArea",
            json!({ "updateSubscriptionArea": area_fixture(id, granularity) }),
        )
        .await;
    }

    /// Answer `FindGroupOccupancies` with the given rows
    pub async fn mock_group_occupancies(&self, records: Value) {
        self.mount_data("FindGroupOccupancies", json!({ "findGroupOccupancies": records }))
            .await;
    }

    /// Answer every request with a GraphQL `errors` array
    pub async fn mock_graphql_error(&self, message: &str) {
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": message, "errorType": "BadRequestException"}]
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with a bare HTTP status
    pub async fn mock_status(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .respond_with(ResponseTemplate::new(status_code).set_body_string("unavailable"))
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of all received requests, in arrival order
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Number of requests whose document mentions `operation`
    pub async fn call_count(&self, operation: &str) -> usize {
        self.received_bodies()
            .await
            .iter()
            .filter(|body| {
                body.get("query")
                    .and_then(Value::as_str)
                    .is_some_and(|query| query.contains(operation))
            })
            .count()
    }

    async fn mount_data(&self, operation: &str, data: Value) {
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(body_string_contains(operation))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .mount(&self.server)
            .await;
    }
}

/// A subscription area as the control plane returns it
pub fn area_fixture(id: i64, granularity: &str) -> Value {
    json!({
        "id": id.to_string(),
        "granularity": granularity,
        "expiresOn": "2030-01-01T00:04:00Z",
        "zoneId": [777],
        "groupId": null,
        "levelId": null,
        "floorNumber": null,
        "labels": null,
        "location": null
    })
}
