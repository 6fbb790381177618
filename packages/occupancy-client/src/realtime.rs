//! Realtime side of the client: one WebSocket connection per subscription

use std::sync::Arc;

use occupancy_shared_config::RealtimeConfig;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::endpoint::RealtimeEndpoint;
use crate::error::{OccupancyError, OccupancyResult};
use crate::handler::MessageHandler;
use crate::protocol::{CloseReason, ConnectionCommand, ConnectionTask, ProtocolSession};
use crate::registry::{ConnectionId, SubscriptionMetadata, SubscriptionRegistry};
use crate::timer::TimerService;

/// A running subscription connection
#[derive(Debug)]
pub struct SubscriptionHandle {
    connection_id: ConnectionId,
    area_id: i64,
    task: JoinHandle<OccupancyResult<CloseReason>>,
}

impl SubscriptionHandle {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn area_id(&self) -> i64 {
        self.area_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the connection to end
    pub async fn closed(self) -> OccupancyResult<CloseReason> {
        self.task
            .await
            .map_err(|e| OccupancyError::Transport(format!("connection task failed: {}", e)))?
    }
}

/// Opens, tracks and tears down subscription connections
#[derive(Clone)]
pub struct RealtimeClient {
    registry: SubscriptionRegistry,
    timers: TimerService,
    endpoint: Arc<RealtimeEndpoint>,
    handler: Arc<dyn MessageHandler>,
    config: RealtimeConfig,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.endpoint.url().host_str())
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl RealtimeClient {
    pub fn new(
        endpoint: RealtimeEndpoint,
        config: RealtimeConfig,
        registry: SubscriptionRegistry,
        timers: TimerService,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            registry,
            timers,
            endpoint: Arc::new(endpoint),
            handler,
            config,
        }
    }

    /// Register a connection for `area_id` and spawn its socket task
    ///
    /// The registry entry exists before this returns; the handshake runs in
    /// the background. Fails once the timers have been shut down, since the
    /// connection could arm neither its ack nor its keepalive timeout.
    pub fn subscribe(&self, area_id: i64, document: &str) -> OccupancyResult<SubscriptionHandle> {
        if self.timers.is_shutdown() {
            return Err(OccupancyError::ShutDown);
        }

        let query = json!({
            "query": document,
            "variables": {"sub_area_id": area_id},
        })
        .to_string();

        let connection_id = ConnectionId::next();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let metadata = SubscriptionMetadata::new(
            area_id,
            Uuid::new_v4().to_string(),
            query,
            self.config.default_keepalive(),
            commands_tx,
        );

        let session = ProtocolSession::new(
            connection_id,
            &metadata,
            self.endpoint.header().clone(),
            self.config.deregister_timeout(),
            self.registry.clone(),
            self.timers.clone(),
            Arc::clone(&self.handler),
        );
        self.registry.insert(connection_id, metadata)?;

        let task = ConnectionTask::new(
            session,
            self.endpoint.url().clone(),
            self.config.connect_timeout(),
            commands_rx,
        );
        let join = tokio::spawn(task.run());

        info!(area_id, connection = %connection_id, "Subscription connection spawned");

        Ok(SubscriptionHandle {
            connection_id,
            area_id,
            task: join,
        })
    }

    /// Ask the connection for `area_id` to deregister; false if none
    pub fn unsubscribe(&self, area_id: i64) -> bool {
        match self.registry.claim_for_deregister(area_id) {
            Some((connection_id, commands)) => {
                if commands.send(ConnectionCommand::Deregister).is_err() {
                    warn!(area_id, connection = %connection_id, "Connection task already gone");
                }
                true
            }
            None => false,
        }
    }

    /// Close every remaining connection without waiting for `complete`
    pub fn close_all(&self) -> usize {
        self.registry
            .connection_ids()
            .into_iter()
            .filter(|id| self.registry.send_command(*id, ConnectionCommand::Shutdown))
            .count()
    }

    pub fn active_area_ids(&self) -> Vec<i64> {
        self.registry.list_active_area_ids()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn endpoint(&self) -> &RealtimeEndpoint {
        &self.endpoint
    }
}
