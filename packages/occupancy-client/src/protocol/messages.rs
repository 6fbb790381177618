//! Realtime protocol message types
//!
//! Frames are JSON text messages discriminated by their `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host and authorization block sent in the connection URL and with `start`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeHeader {
    pub host: String,
    #[serde(rename = "Authorization")]
    pub authorization: String,
}

impl std::fmt::Debug for HandshakeHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeHeader")
            .field("host", &self.host)
            .field("authorization", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from the client to the realtime endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the protocol session
    ConnectionInit,

    /// Registers the subscription
    Start { id: String, payload: StartPayload },

    /// Deregisters the subscription
    Stop { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    /// Serialized `{"query", "variables"}` envelope
    pub data: String,
    pub extensions: StartExtensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartExtensions {
    pub authorization: HandshakeHeader,
}

impl ClientMessage {
    pub fn start(id: impl Into<String>, data: impl Into<String>, header: HandshakeHeader) -> Self {
        Self::Start {
            id: id.into(),
            payload: StartPayload {
                data: data.into(),
                extensions: StartExtensions {
                    authorization: header,
                },
            },
        }
    }
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages received from the realtime endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keepalive
    #[serde(rename = "ka")]
    KeepAlive,

    /// Handshake accepted
    ConnectionAck {
        #[serde(default)]
        payload: Option<AckPayload>,
    },

    /// Handshake rejected
    ConnectionError {
        #[serde(default)]
        payload: Value,
    },

    /// Subscription registered
    StartAck {
        #[serde(default)]
        id: Option<String>,
    },

    /// Subscription update
    Data {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        payload: Value,
    },

    /// Subscription-level error
    Error {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        payload: Value,
    },

    /// Subscription finished, usually in answer to `stop`
    Complete {
        #[serde(default)]
        id: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    #[serde(rename = "connectionTimeoutMs")]
    pub connection_timeout_ms: u64,
}
