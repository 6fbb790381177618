//! Realtime subscription protocol
//!
//! - `messages`: wire frames
//! - `session`: the per-connection state machine
//! - `connection`: the socket task that drives a session

mod connection;
mod messages;
mod session;

pub use connection::{ConnectionTask, SUBPROTOCOL};
pub use messages::{
    AckPayload, ClientMessage, HandshakeHeader, ServerMessage, StartExtensions, StartPayload,
};
pub use session::{CloseReason, ConnectionCommand, ConnectionState, ProtocolSession, Transition};
