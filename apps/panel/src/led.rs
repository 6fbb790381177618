//! LED panel output for occupancy updates

use occupancy_client::{MessageHandler, OccupancySummary};
use serde_json::Value;
use tracing::info;

/// Renders each update as a panel line
#[derive(Debug, Clone, Copy, Default)]
pub struct LedPanelHandler;

impl MessageHandler for LedPanelHandler {
    fn handle_data(&self, area_id: i64, payload: Value) {
        for line in render_lines(area_id, &payload) {
            info!(area_id, line = %line, "Sending message to LED panel");
        }
    }
}

/// One line per update that carries a summary
pub fn render_lines(area_id: i64, payload: &Value) -> Vec<String> {
    let updates = payload
        .pointer("/data/onSubscriptionAreaUpdates/updates")
        .and_then(Value::as_array);

    let Some(updates) = updates else {
        return vec![format!("AREA {}: no data", area_id)];
    };

    updates
        .iter()
        .filter_map(|update| {
            let summary: OccupancySummary =
                serde_json::from_value(update.get("summary")?.clone()).ok()?;
            let label = update
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("AREA {}", area_id));
            Some(summary_line(&label, &summary))
        })
        .collect()
}

pub fn summary_line(label: &str, summary: &OccupancySummary) -> String {
    format!("{}: {} FREE / {}", label, summary.available, summary.total)
}
