//! Realtime connection URL construction

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use occupancy_shared_config::ApiConfig;
use url::Url;

use crate::error::{OccupancyError, OccupancyResult};
use crate::protocol::HandshakeHeader;

/// Empty JSON object (`{}`), base64 encoded
const EMPTY_PAYLOAD: &str = "e30=";

/// Where and how to open realtime connections
#[derive(Debug, Clone)]
pub struct RealtimeEndpoint {
    url: Url,
    header: HandshakeHeader,
}

impl RealtimeEndpoint {
    pub fn from_config(config: &ApiConfig) -> OccupancyResult<Self> {
        let header = HandshakeHeader {
            host: config.host().to_string(),
            authorization: config.auth_token.clone(),
        };

        let raw = config.realtime_url();
        let mut url = Url::parse(&raw)
            .map_err(|e| OccupancyError::Validation(format!("invalid realtime URL {}: {}", raw, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(OccupancyError::Validation(format!(
                "realtime URL must use ws or wss: {}",
                raw
            )));
        }

        let encoded = STANDARD.encode(serde_json::to_vec(&header)?);
        url.set_query(Some(&format!("header={}&payload={}", encoded, EMPTY_PAYLOAD)));

        Ok(Self { url, header })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn header(&self) -> &HandshakeHeader {
        &self.header
    }
}
