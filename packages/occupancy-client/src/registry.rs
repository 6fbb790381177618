//! Registry of open realtime connections
//!
//! Shared by connection tasks, the extension scheduler and the facade.
//! Backed by a [`DashMap`]; removal is a single map operation, so a reader
//! never sees a half-removed entry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{OccupancyError, OccupancyResult};
use crate::protocol::ConnectionCommand;
use crate::timer::{TimerHandle, TimerId};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique handle for one realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State tracked for one open connection
#[derive(Debug, Clone)]
pub struct SubscriptionMetadata {
    /// Logical area being watched
    pub subscription_area_id: i64,

    /// Protocol-level subscription id, fresh per connection
    pub websocket_subscription_id: String,

    /// Serialized `{"query", "variables"}` envelope sent with `start`
    pub query: String,

    /// Keepalive interval; replaced by the server's value on ack
    pub timeout_interval: Duration,

    /// The connection's single armed timer (keepalive or deregistration)
    pub timeout_timer: Option<TimerHandle>,

    /// Set once a stop has been requested
    pub deregistering: bool,

    /// Channel into the owning connection task
    pub commands: mpsc::UnboundedSender<ConnectionCommand>,
}

impl SubscriptionMetadata {
    pub fn new(
        subscription_area_id: i64,
        websocket_subscription_id: impl Into<String>,
        query: impl Into<String>,
        timeout_interval: Duration,
        commands: mpsc::UnboundedSender<ConnectionCommand>,
    ) -> Self {
        Self {
            subscription_area_id,
            websocket_subscription_id: websocket_subscription_id.into(),
            query: query.into(),
            timeout_interval,
            timeout_timer: None,
            deregistering: false,
            commands,
        }
    }
}

/// Concurrency-safe map from connection handle to its metadata
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: Arc<DashMap<ConnectionId, SubscriptionMetadata>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    ///
    /// Fails if the handle is already present or another entry uses the same
    /// websocket subscription id. The id scan and the insert are separate
    /// steps; only the handle check is atomic. Websocket ids are v4 UUIDs, so
    /// two concurrent inserts sharing one is not expected.
    pub fn insert(&self, id: ConnectionId, metadata: SubscriptionMetadata) -> OccupancyResult<()> {
        let duplicate_ws_id = self
            .entries
            .iter()
            .any(|e| e.websocket_subscription_id == metadata.websocket_subscription_id);
        if duplicate_ws_id {
            return Err(OccupancyError::Registry(format!(
                "websocket subscription id {} already registered",
                metadata.websocket_subscription_id
            )));
        }

        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(OccupancyError::Registry(format!(
                "connection {} already registered",
                id
            ))),
            Entry::Vacant(slot) => {
                debug!(
                    connection = %id,
                    area_id = metadata.subscription_area_id,
                    "Registered connection"
                );
                slot.insert(metadata);
                Ok(())
            }
        }
    }

    /// Take an entry out; only one caller ever receives it
    pub fn remove(&self, id: ConnectionId) -> Option<SubscriptionMetadata> {
        self.entries.remove(&id).map(|(_, metadata)| metadata)
    }

    /// Copy of an entry
    pub fn get(&self, id: ConnectionId) -> Option<SubscriptionMetadata> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    /// Point-in-time snapshot of the watched area ids
    pub fn list_active_area_ids(&self) -> Vec<i64> {
        self.entries
            .iter()
            .map(|e| e.subscription_area_id)
            .collect()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    pub fn set_timeout_interval(&self, id: ConnectionId, interval: Duration) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.timeout_interval = interval;
                true
            }
            None => false,
        }
    }

    /// Install `timer` as the connection's timer, canceling the previous one
    ///
    /// If the entry is already gone the new timer is canceled too.
    pub fn replace_timer(&self, id: ConnectionId, timer: TimerHandle) -> bool {
        let previous = match self.entries.get_mut(&id) {
            Some(mut entry) => entry.timeout_timer.replace(timer),
            None => {
                timer.cancel();
                return false;
            }
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        true
    }

    pub fn current_timer_id(&self, id: ConnectionId) -> Option<TimerId> {
        self.entries
            .get(&id)
            .and_then(|e| e.timeout_timer.as_ref().map(TimerHandle::id))
    }

    /// Mark the first not-yet-deregistering connection for `area_id`
    ///
    /// Returns its handle and command channel; the flag is flipped under the
    /// entry lock so two callers never claim the same connection.
    pub fn claim_for_deregister(
        &self,
        area_id: i64,
    ) -> Option<(ConnectionId, mpsc::UnboundedSender<ConnectionCommand>)> {
        for mut entry in self.entries.iter_mut() {
            if entry.subscription_area_id == area_id && !entry.deregistering {
                entry.deregistering = true;
                return Some((*entry.key(), entry.commands.clone()));
            }
        }
        None
    }

    /// Deliver a command to a connection task
    pub fn send_command(&self, id: ConnectionId, command: ConnectionCommand) -> bool {
        let sender = match self.entries.get(&id) {
            Some(entry) => entry.commands.clone(),
            None => return false,
        };
        sender.send(command).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
