//! Occupancy LED panel
//!
//! Prints the current occupancy of the configured zone, then keeps a zone
//! and a level subscription open and renders every update until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use occupancy_client::{
    Granularity, OccupancyClient, OccupancyFilter, SubscriptionAreaCreate,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod led;

use config::Config;
use led::{summary_line, LedPanelHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "occupancy_panel=debug,occupancy_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(zone_id = config.zone_id, "Starting occupancy panel");

    let client = OccupancyClient::new(&config.client, Arc::new(LedPanelHandler))
        .context("Failed to build occupancy client")?;

    let zones = client
        .find_zone_occupancies(&OccupancyFilter::new().zone(config.zone_id))
        .await
        .context("Failed to load zone occupancy")?;
    for zone in &zones {
        println!("{}", summary_line(&format!("ZONE {}", config.zone_id), &zone.summary));
    }

    let mut level_filter = OccupancyFilter::new().zone(config.zone_id);
    if let Some(floor) = config.floor_number {
        level_filter = level_filter.floor(floor);
    }
    for level in client.find_level_occupancies(&level_filter).await? {
        let label = format!("LEVEL {}", level.id.unwrap_or_default());
        println!("{}", summary_line(&label, &level.summary));
    }

    let zone_area = client
        .create_subscription_area(
            &SubscriptionAreaCreate::new(Granularity::Zone).zone_id([config.zone_id]),
        )
        .await
        .context("Failed to create zone subscription area")?;

    let mut level_request = SubscriptionAreaCreate::new(Granularity::Level).zone_id([config.zone_id]);
    if let Some(floor) = config.floor_number {
        level_request = level_request.floor_number([floor]);
    }
    let level_area = client
        .create_subscription_area(&level_request)
        .await
        .context("Failed to create level subscription area")?;

    let handles = [&zone_area, &level_area]
        .into_iter()
        .map(|area| client.subscribe_to_area(area.id, area.granularity))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        areas = ?client.active_area_ids(),
        "Subscribed, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Ctrl-C received, unsubscribing");
    client.shutdown(config.shutdown_grace()).await;

    for handle in handles {
        let area_id = handle.area_id();
        match handle.closed().await {
            Ok(reason) => tracing::info!(area_id, reason = %reason, "Subscription ended"),
            Err(e) => tracing::warn!(area_id, error = %e, "Subscription failed"),
        }
    }

    Ok(())
}
