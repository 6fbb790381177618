//! Common helpers for occupancy-client integration tests
//!
//! Builds clients wired to the mock control plane and realtime server.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use occupancy_client::{ChannelHandler, DataEvent, OccupancyClient};
use occupancy_shared_config::{ApiConfig, ClientConfig, RealtimeConfig};
use tokio::sync::mpsc;

pub use occupancy_test_utils::{area_fixture, MockControlPlane, MockRealtimeServer, RealtimeBehavior};

/// Generous bound for anything the tests wait on
pub const WAIT: Duration = Duration::from_secs(5);

/// Realtime settings with short windows so timeouts trigger quickly
pub fn fast_realtime() -> RealtimeConfig {
    RealtimeConfig {
        extension_interval_secs: 240,
        default_keepalive_secs: 2,
        deregister_timeout_secs: 1,
        connect_timeout_secs: 2,
    }
}

pub fn client_config(
    control_plane: &MockControlPlane,
    realtime: &MockRealtimeServer,
    settings: RealtimeConfig,
) -> ClientConfig {
    let api = ApiConfig::new(control_plane.url(), "test-token").with_realtime_url(realtime.url());
    ClientConfig::new(api).with_realtime(settings)
}

/// Client over the real HTTP executor, forwarding data to a channel
pub fn channel_client(config: &ClientConfig) -> (OccupancyClient, mpsc::UnboundedReceiver<DataEvent>) {
    let (handler, events) = ChannelHandler::channel();
    let client = OccupancyClient::new(config, Arc::new(handler)).unwrap();
    (client, events)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
