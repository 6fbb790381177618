//! Public entry point composing control plane, realtime connections and the
//! extension scheduler

use std::sync::Arc;
use std::time::Duration;

use occupancy_graphql_client::{GraphqlClient, QueryExecutor};
use occupancy_shared_config::ClientConfig;
use tracing::{debug, info, instrument, warn};

use crate::control_plane::ControlPlane;
use crate::documents;
use crate::endpoint::RealtimeEndpoint;
use crate::error::OccupancyResult;
use crate::extender::ExtensionScheduler;
use crate::handler::MessageHandler;
use crate::models::{
    Granularity, LevelOccupancy, OccupancyFilter, SubscriptionArea, SubscriptionAreaCreate,
    SubscriptionAreaUpdate, ZoneOccupancy,
};
use crate::occupancy;
use crate::realtime::{RealtimeClient, SubscriptionHandle};
use crate::registry::SubscriptionRegistry;
use crate::timer::TimerService;

/// Interval between registry checks while draining on shutdown
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Occupancy subscription client
///
/// Cheap to clone; clones share connections, registry and scheduler.
#[derive(Clone, Debug)]
pub struct OccupancyClient {
    control_plane: ControlPlane,
    realtime: RealtimeClient,
    scheduler: ExtensionScheduler,
    timers: TimerService,
}

impl OccupancyClient {
    /// Client talking to the configured HTTP endpoint
    pub fn new(config: &ClientConfig, handler: Arc<dyn MessageHandler>) -> OccupancyResult<Self> {
        let graphql = GraphqlClient::new(&config.api)?;
        Self::with_executor(config, Arc::new(graphql), handler)
    }

    /// Client using a caller-supplied query executor
    pub fn with_executor(
        config: &ClientConfig,
        executor: Arc<dyn QueryExecutor>,
        handler: Arc<dyn MessageHandler>,
    ) -> OccupancyResult<Self> {
        config.realtime.validate()?;
        let endpoint = RealtimeEndpoint::from_config(&config.api)?;

        let registry = SubscriptionRegistry::new();
        let timers = TimerService::new();
        let control_plane = ControlPlane::new(executor);
        let scheduler = ExtensionScheduler::new(
            config.realtime.extension_interval(),
            registry.clone(),
            timers.clone(),
            Arc::new(control_plane.clone()),
        );
        let realtime = RealtimeClient::new(
            endpoint,
            config.realtime.clone(),
            registry,
            timers.clone(),
            handler,
        );

        Ok(Self {
            control_plane,
            realtime,
            scheduler,
            timers,
        })
    }

    pub async fn create_subscription_area(
        &self,
        request: &SubscriptionAreaCreate,
    ) -> OccupancyResult<SubscriptionArea> {
        self.control_plane.create_subscription_area(request).await
    }

    pub async fn update_subscription_area(
        &self,
        update: &SubscriptionAreaUpdate,
    ) -> OccupancyResult<SubscriptionArea> {
        self.control_plane.update_subscription_area(update).await
    }

    pub async fn extend_subscription_area(&self, area_id: i64) -> OccupancyResult<SubscriptionArea> {
        self.control_plane.extend_subscription_area(area_id).await
    }

    /// Open a realtime connection for `area_id`
    ///
    /// The granularity is checked before anything is registered. The
    /// extension scheduler is started once the connection is registered.
    #[instrument(skip(self, granularity), fields(granularity = granularity.as_ref()))]
    pub fn subscribe_to_area(
        &self,
        area_id: i64,
        granularity: impl AsRef<str>,
    ) -> OccupancyResult<SubscriptionHandle> {
        let granularity: Granularity = granularity.as_ref().parse()?;
        let document = documents::subscription_for(granularity);

        let handle = self.realtime.subscribe(area_id, &document)?;
        if self.scheduler.ensure_started() {
            debug!(area_id, "Extension scheduler started by subscribe");
        }
        Ok(handle)
    }

    /// Gracefully deregister the connection for `area_id`; false if none
    #[instrument(skip(self))]
    pub fn unsubscribe_from_area(&self, area_id: i64) -> bool {
        let found = self.realtime.unsubscribe(area_id);
        if !found {
            debug!(area_id, "No active subscription to remove");
        }
        found
    }

    /// Deregister every connection in a snapshot of the registry
    pub fn unsubscribe_from_all(&self) -> usize {
        let area_ids = self.realtime.active_area_ids();
        let count = area_ids
            .into_iter()
            .filter(|area_id| self.unsubscribe_from_area(*area_id))
            .count();
        info!(count, "Unsubscribed from all areas");
        count
    }

    /// Area ids with a registered connection, one per connection
    pub fn active_area_ids(&self) -> Vec<i64> {
        self.realtime.active_area_ids()
    }

    /// Occupancy summed per zone
    pub async fn find_zone_occupancies(
        &self,
        filter: &OccupancyFilter,
    ) -> OccupancyResult<Vec<ZoneOccupancy>> {
        let records = self.control_plane.find_group_occupancies(filter).await?;
        Ok(occupancy::group_by_zone(&records))
    }

    /// Occupancy summed per (level, zone)
    pub async fn find_level_occupancies(
        &self,
        filter: &OccupancyFilter,
    ) -> OccupancyResult<Vec<LevelOccupancy>> {
        let records = self.control_plane.find_group_occupancies(filter).await?;
        Ok(occupancy::group_by_level(&records))
    }

    pub fn is_extending(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    /// Unsubscribe everything and release timers
    ///
    /// Connections that have not completed within `grace` are closed
    /// without waiting for the server. The client is single-use: later
    /// subscribes fail with [`OccupancyError::ShutDown`].
    ///
    /// [`OccupancyError::ShutDown`]: crate::OccupancyError::ShutDown
    pub async fn shutdown(&self, grace: Duration) {
        info!(grace_ms = grace.as_millis() as u64, "Shutting down occupancy client");
        self.unsubscribe_from_all();
        self.scheduler.stop();

        let registry = self.realtime.registry();
        let deadline = tokio::time::Instant::now() + grace;
        while !registry.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }

        if !registry.is_empty() {
            let forced = self.realtime.close_all();
            warn!(forced, "Closing connections that did not complete in time");
            let deadline = tokio::time::Instant::now() + grace;
            while !registry.is_empty() && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            if !registry.is_empty() {
                warn!(remaining = registry.len(), "Connections still registered after shutdown");
            }
        }

        self.timers.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OccupancyError;
    use crate::handler::LoggingHandler;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use occupancy_graphql_client::GraphqlResult;
    use occupancy_shared_config::{ApiConfig, RealtimeConfig};
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    struct NullExecutor;

    #[async_trait]
    impl QueryExecutor for NullExecutor {
        async fn execute(&self, _document: &str, _variables: Value) -> GraphqlResult<Value> {
            Ok(json!({}))
        }
    }

    fn client(realtime: RealtimeConfig) -> OccupancyClient {
        let api = ApiConfig::new("https://example.appsync-api.test/graphql", "token")
            .with_realtime_url("ws://127.0.0.1:9/graphql");
        let config = ClientConfig::new(api).with_realtime(realtime);
        OccupancyClient::with_executor(&config, Arc::new(NullExecutor), Arc::new(LoggingHandler))
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_granularity_opens_nothing() {
        let client = client(RealtimeConfig::default());

        assert_matches!(
            client.subscribe_to_area(7, "Invalid"),
            Err(OccupancyError::UnsupportedGranularity(g)) if g == "Invalid"
        );
        assert!(client.active_area_ids().is_empty());
        assert!(!client.is_extending());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unsubscribe_unknown_area() {
        let client = client(RealtimeConfig::default());
        assert!(!client.unsubscribe_from_area(42));
        assert_eq!(client.unsubscribe_from_all(), 0);
        assert!(logs_contain("No active subscription to remove"));
    }

    #[tokio::test]
    async fn test_invalid_realtime_config_rejected() {
        let api = ApiConfig::new("https://example.appsync-api.test/graphql", "token");
        let config =
            ClientConfig::new(api).with_realtime(RealtimeConfig::default().with_extension_interval(0));

        assert_matches!(
            OccupancyClient::with_executor(&config, Arc::new(NullExecutor), Arc::new(LoggingHandler)),
            Err(OccupancyError::Config(_))
        );
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_registry_empty() {
        let client = client(RealtimeConfig::default());

        let handle = client.subscribe_to_area(42, "Zone").unwrap();
        assert_eq!(client.active_area_ids(), vec![42]);
        assert!(client.is_extending());

        // Nothing listens on port 9
        assert_matches!(
            handle.closed().await,
            Err(OccupancyError::Transport(_))
        );
        assert!(client.active_area_ids().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_nothing_registered() {
        let client = client(RealtimeConfig::default());
        client.shutdown(Duration::from_millis(100)).await;
        assert!(!client.is_extending());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_rejected() {
        let client = client(RealtimeConfig::default());
        client.shutdown(Duration::from_millis(100)).await;

        assert_matches!(client.subscribe_to_area(42, "Zone"), Err(OccupancyError::ShutDown));
        assert!(client.active_area_ids().is_empty());
        assert!(!client.is_extending());
    }
}
