//! Per-connection protocol state machine
//!
//! [`ProtocolSession`] holds no socket. It consumes inbound frames and
//! commands and answers with a [`Transition`]; the connection task performs
//! the I/O. Timers are armed through the [`TimerService`] and report back as
//! [`ConnectionCommand::TimerExpired`] on the connection's command channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, HandshakeHeader, ServerMessage};
use crate::handler::MessageHandler;
use crate::registry::{ConnectionId, SubscriptionMetadata, SubscriptionRegistry};
use crate::timer::{TimerId, TimerService};

/// Lower bound for a server-advertised keepalive interval
const MIN_KEEPALIVE: Duration = Duration::from_secs(1);

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Active,
    Closing,
    Closed,
}

/// Requests delivered to a connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Send `stop` and wait for `complete`
    Deregister,
    /// A timer armed by the session went off
    TimerExpired { timer_id: TimerId },
    /// Close immediately
    Shutdown,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Server sent `complete`
    Completed,
    /// Server sent `error` or `connection_error`
    ServerError,
    /// Socket failed
    TransportError(String),
    /// No keepalive within the advertised interval
    KeepaliveTimeout,
    /// No `complete` after `stop`
    DeregisterTimeout,
    /// Server closed the socket
    RemoteClosed,
    /// Client shutdown
    Shutdown,
    /// Connection task ended without closing, e.g. a panicking handler
    Aborted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::ServerError => write!(f, "server error"),
            Self::TransportError(e) => write!(f, "transport error: {}", e),
            Self::KeepaliveTimeout => write!(f, "keepalive timeout"),
            Self::DeregisterTimeout => write!(f, "deregister timeout"),
            Self::RemoteClosed => write!(f, "closed by server"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Aborted => write!(f, "task aborted"),
        }
    }
}

/// What the connection task should do next
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Stay,
    Send(ClientMessage),
    Close(CloseReason),
}

/// Protocol driver for one registered connection
pub struct ProtocolSession {
    id: ConnectionId,
    area_id: i64,
    websocket_subscription_id: String,
    query: String,
    default_keepalive: Duration,
    deregister_timeout: Duration,
    header: HandshakeHeader,
    state: ConnectionState,
    registry: SubscriptionRegistry,
    timers: TimerService,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    handler: Arc<dyn MessageHandler>,
}

impl fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("id", &self.id)
            .field("area_id", &self.area_id)
            .field("state", &self.state)
            .finish()
    }
}

impl ProtocolSession {
    /// Session for a connection whose metadata is already registered
    pub fn new(
        id: ConnectionId,
        metadata: &SubscriptionMetadata,
        header: HandshakeHeader,
        deregister_timeout: Duration,
        registry: SubscriptionRegistry,
        timers: TimerService,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            id,
            area_id: metadata.subscription_area_id,
            websocket_subscription_id: metadata.websocket_subscription_id.clone(),
            query: metadata.query.clone(),
            default_keepalive: metadata.timeout_interval,
            deregister_timeout,
            header,
            state: ConnectionState::Connecting,
            registry,
            timers,
            commands: metadata.commands.clone(),
            handler,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn area_id(&self) -> i64 {
        self.area_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Socket opened: start the handshake
    ///
    /// The default keepalive interval also bounds the wait for the ack.
    pub fn on_open(&mut self) -> ClientMessage {
        self.state = ConnectionState::Handshaking;
        self.arm_timer(self.default_keepalive);
        info!(area_id = self.area_id, connection = %self.id, "Connection init");
        ClientMessage::ConnectionInit
    }

    /// Handle one inbound text frame
    pub fn on_text(&mut self, text: &str) -> Transition {
        if self.state == ConnectionState::Closed {
            return Transition::Stay;
        }

        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(area_id = self.area_id, error = %e, "Ignoring malformed frame");
                return Transition::Stay;
            }
        };

        match message {
            ServerMessage::KeepAlive => {
                if matches!(
                    self.state,
                    ConnectionState::Handshaking | ConnectionState::Active
                ) {
                    let interval = self.timeout_interval();
                    self.arm_timer(interval);
                    debug!(area_id = self.area_id, interval_secs = interval.as_secs(), "Reset keepalive timer");
                }
                Transition::Stay
            }
            ServerMessage::ConnectionAck { payload } => self.on_ack(payload.map(|p| p.connection_timeout_ms)),
            ServerMessage::StartAck { .. } => {
                debug!(area_id = self.area_id, "Subscription registered by server");
                Transition::Stay
            }
            ServerMessage::Data { payload, .. } => {
                self.handler.handle_data(self.area_id, payload);
                Transition::Stay
            }
            ServerMessage::Error { payload, .. } | ServerMessage::ConnectionError { payload } => {
                error!(area_id = self.area_id, payload = %payload, "Error from realtime endpoint");
                self.state = ConnectionState::Closing;
                Transition::Close(CloseReason::ServerError)
            }
            ServerMessage::Complete { .. } => Transition::Close(CloseReason::Completed),
            ServerMessage::Unknown => {
                debug!(area_id = self.area_id, frame = text, "Ignoring unknown frame type");
                Transition::Stay
            }
        }
    }

    fn on_ack(&mut self, timeout_ms: Option<u64>) -> Transition {
        if self.state != ConnectionState::Handshaking {
            debug!(area_id = self.area_id, state = ?self.state, "Ignoring unexpected connection_ack");
            return Transition::Stay;
        }

        let interval = timeout_ms
            .map(|ms| Duration::from_secs(ms / 1000).max(MIN_KEEPALIVE))
            .unwrap_or(self.default_keepalive);
        self.registry.set_timeout_interval(self.id, interval);
        self.state = ConnectionState::Active;
        self.arm_timer(interval);

        info!(
            area_id = self.area_id,
            timeout_secs = interval.as_secs(),
            "Connection acknowledged, starting subscription"
        );

        Transition::Send(ClientMessage::start(
            self.websocket_subscription_id.clone(),
            self.query.clone(),
            self.header.clone(),
        ))
    }

    /// Handle a command from the facade or a timer
    pub fn on_command(&mut self, command: ConnectionCommand) -> Transition {
        match command {
            ConnectionCommand::Deregister => match self.state {
                ConnectionState::Active => {
                    self.state = ConnectionState::Closing;
                    self.arm_timer(self.deregister_timeout);
                    info!(area_id = self.area_id, "Deregistering subscription");
                    Transition::Send(ClientMessage::Stop {
                        id: self.websocket_subscription_id.clone(),
                    })
                }
                // Nothing started server-side yet
                ConnectionState::Connecting | ConnectionState::Handshaking => {
                    Transition::Close(CloseReason::Completed)
                }
                ConnectionState::Closing | ConnectionState::Closed => Transition::Stay,
            },
            ConnectionCommand::TimerExpired { timer_id } => {
                if self.state == ConnectionState::Closed
                    || self.registry.current_timer_id(self.id) != Some(timer_id)
                {
                    debug!(area_id = self.area_id, timer_id, "Ignoring stale timer");
                    return Transition::Stay;
                }
                if self.state == ConnectionState::Closing {
                    warn!(area_id = self.area_id, "No complete after stop, forcing close");
                    Transition::Close(CloseReason::DeregisterTimeout)
                } else {
                    warn!(area_id = self.area_id, "Keepalive timed out");
                    Transition::Close(CloseReason::KeepaliveTimeout)
                }
            }
            ConnectionCommand::Shutdown => Transition::Close(CloseReason::Shutdown),
        }
    }

    /// Enter `Closed`, remove the registry entry and cancel its timer
    ///
    /// Returns the removed metadata to the one caller that removed it.
    pub fn close(&mut self, reason: &CloseReason) -> Option<SubscriptionMetadata> {
        self.state = ConnectionState::Closed;
        let removed = self.registry.remove(self.id);
        if let Some(metadata) = &removed {
            if let Some(timer) = &metadata.timeout_timer {
                timer.cancel();
            }
            info!(
                area_id = self.area_id,
                connection = %self.id,
                reason = %reason,
                "Removed active subscription"
            );
        }
        removed
    }

    fn timeout_interval(&self) -> Duration {
        self.registry
            .get(self.id)
            .map(|m| m.timeout_interval)
            .unwrap_or(self.default_keepalive)
    }

    fn arm_timer(&self, delay: Duration) {
        let commands = self.commands.clone();
        let handle = self.timers.schedule(delay, move |timer_id| async move {
            let _ = commands.send(ConnectionCommand::TimerExpired { timer_id });
        });
        self.registry.replace_timer(self.id, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ChannelHandler;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct Fixture {
        session: ProtocolSession,
        registry: SubscriptionRegistry,
        commands: mpsc::UnboundedReceiver<ConnectionCommand>,
        data: mpsc::UnboundedReceiver<crate::handler::DataEvent>,
    }

    fn fixture() -> Fixture {
        let registry = SubscriptionRegistry::new();
        let timers = TimerService::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (handler, data) = ChannelHandler::channel();
        let id = ConnectionId::next();
        let metadata = SubscriptionMetadata::new(
            42,
            "ws-42",
            r#"{"query":"subscription","variables":{"sub_area_id":42}}"#,
            Duration::from_secs(10),
            tx,
        );
        registry.insert(id, metadata.clone()).unwrap();

        let header = HandshakeHeader {
            host: "example.appsync-api.test".to_string(),
            authorization: "token".to_string(),
        };
        let session = ProtocolSession::new(
            id,
            &metadata,
            header,
            Duration::from_secs(5),
            registry.clone(),
            timers,
            Arc::new(handler),
        );

        Fixture {
            session,
            registry,
            commands: rx,
            data,
        }
    }

    fn ack(ms: u64) -> String {
        json!({"type": "connection_ack", "payload": {"connectionTimeoutMs": ms}}).to_string()
    }

    fn activate(f: &mut Fixture, ms: u64) {
        assert_eq!(f.session.on_open(), ClientMessage::ConnectionInit);
        assert_matches!(f.session.on_text(&ack(ms)), Transition::Send(ClientMessage::Start { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_sends_start() {
        let mut f = fixture();
        assert_eq!(f.session.state(), ConnectionState::Connecting);

        f.session.on_open();
        assert_eq!(f.session.state(), ConnectionState::Handshaking);

        let transition = f.session.on_text(&ack(300_000));
        assert_matches!(
            transition,
            Transition::Send(ClientMessage::Start { ref id, ref payload })
                if id == "ws-42" && payload.data.contains("sub_area_id")
                    && payload.extensions.authorization.authorization == "token"
        );
        assert_eq!(f.session.state(), ConnectionState::Active);

        let metadata = f.registry.get(f.session.id()).unwrap();
        assert_eq!(metadata.timeout_interval, Duration::from_secs(300));
        assert!(metadata.timeout_timer.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_clamped() {
        let mut f = fixture();
        activate(&mut f, 500);
        let metadata = f.registry.get(f.session.id()).unwrap();
        assert_eq!(metadata.timeout_interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_rearms_timer() {
        let mut f = fixture();
        activate(&mut f, 4_000);

        let before = f.registry.get(f.session.id()).unwrap().timeout_timer.unwrap();
        assert_eq!(f.session.on_text(r#"{"type":"ka"}"#), Transition::Stay);
        let after = f.registry.get(f.session.id()).unwrap().timeout_timer.unwrap();

        assert!(before.is_cancelled());
        assert!(!after.is_cancelled());
        assert_ne!(before.id(), after.id());

        // New timer fires after exactly the advertised interval
        tokio::time::sleep(Duration::from_millis(3_999)).await;
        assert!(f.commands.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(
            f.commands.recv().await,
            Some(ConnectionCommand::TimerExpired { timer_id: after.id() })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_timeout_closes_once() {
        let mut f = fixture();
        activate(&mut f, 2_000);

        let command = f.commands.recv().await.unwrap();
        let transition = f.session.on_command(command);
        assert_eq!(transition, Transition::Close(CloseReason::KeepaliveTimeout));

        assert!(f.session.close(&CloseReason::KeepaliveTimeout).is_some());
        assert!(f.session.close(&CloseReason::KeepaliveTimeout).is_none());
        assert!(f.registry.is_empty());
        assert_eq!(f.session.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_ignored() {
        let mut f = fixture();
        activate(&mut f, 2_000);
        let stale = f.registry.current_timer_id(f.session.id()).unwrap();
        f.session.on_text(r#"{"type":"ka"}"#);

        let transition = f
            .session
            .on_command(ConnectionCommand::TimerExpired { timer_id: stale });
        assert_eq!(transition, Transition::Stay);
        assert_eq!(f.session.state(), ConnectionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_forwarded_to_handler() {
        let mut f = fixture();
        activate(&mut f, 10_000);

        let frame = json!({
            "type": "data",
            "id": "ws-42",
            "payload": {"data": {"onSubscriptionAreaUpdates": {"id": "42"}}}
        });
        assert_eq!(f.session.on_text(&frame.to_string()), Transition::Stay);

        let event = f.data.recv().await.unwrap();
        assert_eq!(event.area_id, 42);
        assert_eq!(
            event.payload,
            json!({"data": {"onSubscriptionAreaUpdates": {"id": "42"}}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_closes() {
        let mut f = fixture();
        activate(&mut f, 10_000);

        let frame = r#"{"type":"error","id":"ws-42","payload":{"errors":[{"message":"boom"}]}}"#;
        assert_eq!(
            f.session.on_text(frame),
            Transition::Close(CloseReason::ServerError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_sends_stop_then_complete_closes() {
        let mut f = fixture();
        activate(&mut f, 10_000);

        let transition = f.session.on_command(ConnectionCommand::Deregister);
        assert_eq!(
            transition,
            Transition::Send(ClientMessage::Stop {
                id: "ws-42".to_string()
            })
        );
        assert_eq!(f.session.state(), ConnectionState::Closing);

        // A second request while closing is a no-op
        assert_eq!(
            f.session.on_command(ConnectionCommand::Deregister),
            Transition::Stay
        );

        assert_eq!(
            f.session.on_text(r#"{"type":"complete","id":"ws-42"}"#),
            Transition::Close(CloseReason::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_timeout() {
        let mut f = fixture();
        activate(&mut f, 60_000);
        f.session.on_command(ConnectionCommand::Deregister);

        // Deregistration window (5s) is shorter than the keepalive (60s)
        let command = f.commands.recv().await.unwrap();
        assert_eq!(
            f.session.on_command(command),
            Transition::Close(CloseReason::DeregisterTimeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregister_during_handshake_closes() {
        let mut f = fixture();
        f.session.on_open();
        assert_eq!(
            f.session.on_command(ConnectionCommand::Deregister),
            Transition::Close(CloseReason::Completed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_unknown_frames_ignored() {
        let mut f = fixture();
        activate(&mut f, 10_000);

        assert_eq!(f.session.on_text("not json"), Transition::Stay);
        assert_eq!(f.session.on_text(r#"{"type":"start_ack","id":"ws-42"}"#), Transition::Stay);
        assert_eq!(f.session.on_text(r#"{"type":"mystery"}"#), Transition::Stay);
        assert_eq!(f.session.state(), ConnectionState::Active);
    }
}
