//! Shared test utilities for the occupancy workspace
//!
//! Mock implementations of the two external endpoints so client tests run
//! without network dependencies.
//!
//! # Mock Services
//!
//! - [`MockControlPlane`] - GraphQL/HTTP control plane for area mutations and queries
//! - [`MockRealtimeServer`] - `graphql-ws` WebSocket endpoint for subscription tests
//!
//! # Example
//!
//! ```rust,ignore
//! use occupancy_test_utils::{MockControlPlane, MockRealtimeServer, RealtimeBehavior};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let control_plane = MockControlPlane::start().await;
//!     control_plane.mock_create_area(31, "Zone").await;
//!     let realtime = MockRealtimeServer::start(RealtimeBehavior::default()).await;
//!
//!     // ApiConfig::new(control_plane.url(), "token").with_realtime_url(realtime.url())
//! }
//! ```

mod control_plane;
mod realtime;

pub use control_plane::{area_fixture, MockControlPlane};
pub use realtime::{MockRealtimeServer, RealtimeBehavior};
