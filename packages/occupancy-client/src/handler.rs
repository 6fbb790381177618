//! Consumers of subscription data payloads

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Processes one data payload received on a subscription
///
/// Called on the connection's task in arrival order, so implementations
/// should hand heavy work off rather than block.
pub trait MessageHandler: Send + Sync {
    fn handle_data(&self, area_id: i64, payload: Value);
}

/// Logs every payload at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn handle_data(&self, area_id: i64, payload: Value) {
        info!(area_id, payload = %payload, "Received occupancy update");
    }
}

/// A payload tagged with its area and arrival time
#[derive(Debug, Clone, PartialEq)]
pub struct DataEvent {
    pub area_id: i64,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Forwards payloads into a channel
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<DataEvent>,
}

impl ChannelHandler {
    pub fn new(sender: mpsc::UnboundedSender<DataEvent>) -> Self {
        Self { sender }
    }

    /// Handler plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DataEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MessageHandler for ChannelHandler {
    fn handle_data(&self, area_id: i64, payload: Value) {
        let event = DataEvent {
            area_id,
            payload,
            received_at: Utc::now(),
        };
        if self.sender.send(event).is_err() {
            warn!(area_id, "Data receiver dropped, discarding update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_handler_forwards() {
        let (handler, mut rx) = ChannelHandler::channel();
        handler.handle_data(9, json!({"data": {"id": "9"}}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.area_id, 9);
        assert_eq!(event.payload["data"]["id"], "9");
    }

    #[test]
    fn test_channel_handler_tolerates_closed_receiver() {
        let (handler, rx) = ChannelHandler::channel();
        drop(rx);
        handler.handle_data(1, json!(null));
    }
}
