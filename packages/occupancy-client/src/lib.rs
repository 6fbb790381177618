//! Subscription manager for the real-time occupancy feed
//!
//! Subscription areas are created and extended over GraphQL/HTTP; updates
//! for an area arrive over a dedicated WebSocket connection speaking the
//! `graphql-ws` protocol. Every open connection is tracked in a
//! [`SubscriptionRegistry`], and while any is registered an
//! [`ExtensionScheduler`] keeps the areas from expiring.
//!
//! # Thread Safety
//!
//! [`OccupancyClient`] is `Clone + Send + Sync`; clones share the registry,
//! timers and scheduler. Each connection runs on its own tokio task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use occupancy_client::{Granularity, LoggingHandler, OccupancyClient, SubscriptionAreaCreate};
//! use occupancy_shared_config::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?;
//! let client = OccupancyClient::new(&config, Arc::new(LoggingHandler))?;
//!
//! let area = client
//!     .create_subscription_area(&SubscriptionAreaCreate::new(Granularity::Zone).zone_id([777]))
//!     .await?;
//! client.subscribe_to_area(area.id, "Zone")?;
//!
//! // ... later
//! client.shutdown(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod control_plane;
pub mod documents;
mod endpoint;
mod error;
mod extender;
mod handler;
mod models;
mod occupancy;
pub mod protocol;
mod realtime;
mod registry;
mod timer;

pub use client::OccupancyClient;
pub use control_plane::ControlPlane;
pub use documents::MutationField;
pub use endpoint::RealtimeEndpoint;
pub use error::{OccupancyError, OccupancyResult};
pub use extender::{AreaExtender, ExtensionScheduler};
pub use handler::{ChannelHandler, DataEvent, LoggingHandler, MessageHandler};
pub use models::{
    GeoFilter, Granularity, GroupOccupancyRecord, HierarchyFilters, LevelOccupancy, Location,
    OccupancyFilter, OccupancySummary, Patch, SubscriptionArea, SubscriptionAreaCreate,
    SubscriptionAreaUpdate, ZoneOccupancy,
};
pub use occupancy::{group_by_level, group_by_zone, sum_summaries};
pub use realtime::{RealtimeClient, SubscriptionHandle};
pub use registry::{ConnectionId, SubscriptionMetadata, SubscriptionRegistry};
pub use timer::{TimerHandle, TimerId, TimerService};
