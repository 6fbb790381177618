//! WebSocket driver for one subscription connection

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use url::Url;

use super::messages::ClientMessage;
use super::session::{CloseReason, ConnectionCommand, ConnectionState, ProtocolSession, Transition};
use crate::error::{OccupancyError, OccupancyResult};

/// WebSocket subprotocol spoken by the realtime endpoint
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Owns the socket for one session and runs its event loop
pub struct ConnectionTask {
    session: ProtocolSession,
    url: Url,
    connect_timeout: Duration,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl ConnectionTask {
    pub fn new(
        session: ProtocolSession,
        url: Url,
        connect_timeout: Duration,
        commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            session,
            url,
            connect_timeout,
            commands,
        }
    }

    /// Connect, handshake and process frames until the session closes
    ///
    /// The registry entry is removed on every exit path, including an unwind
    /// or abort of the task (see the `Drop` impl). Failing to connect is a
    /// transport error; any close after that is reported as its reason.
    pub async fn run(mut self) -> OccupancyResult<CloseReason> {
        let area_id = self.session.area_id();

        let mut request = match self.url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => return Err(self.fail(e.to_string())),
        };
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        debug!(area_id, connection = %self.session.id(), "Opening realtime connection");

        let stream = match tokio::time::timeout(self.connect_timeout, connect_async(request)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(self.fail(e.to_string())),
            Err(_) => {
                let reason = format!("connect timed out after {:?}", self.connect_timeout);
                return Err(self.fail(reason));
            }
        };

        info!(area_id, connection = %self.session.id(), "Websocket created");
        let (mut write, mut read) = stream.split();

        let init = self.session.on_open();
        if let Err(e) = send(&mut write, &init).await {
            return Ok(self.finish(CloseReason::TransportError(e)));
        }

        loop {
            let transition = tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        debug!(area_id, message = %text, "Message");
                        self.session.on_text(&text)
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(area_id, ?frame, "Close frame received");
                        Transition::Close(CloseReason::RemoteClosed)
                    }
                    Some(Ok(_)) => Transition::Stay,
                    Some(Err(e)) => {
                        error!(area_id, error = %e, "Realtime socket error");
                        Transition::Close(CloseReason::TransportError(e.to_string()))
                    }
                    None => Transition::Close(CloseReason::RemoteClosed),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.session.on_command(command),
                    None => Transition::Close(CloseReason::Shutdown),
                },
            };

            match transition {
                Transition::Stay => {}
                Transition::Send(message) => {
                    if let Err(e) = send(&mut write, &message).await {
                        error!(area_id, error = %e, "Failed to send frame");
                        return Ok(self.finish(CloseReason::TransportError(e)));
                    }
                }
                Transition::Close(reason) => {
                    if !matches!(reason, CloseReason::RemoteClosed | CloseReason::TransportError(_)) {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!(area_id, error = %e, "Close frame not sent");
                        }
                    }
                    return Ok(self.finish(reason));
                }
            }
        }
    }

    fn fail(&mut self, reason: String) -> OccupancyError {
        warn!(area_id = self.session.area_id(), error = %reason, "Realtime connection failed");
        self.session
            .close(&CloseReason::TransportError(reason.clone()));
        OccupancyError::Transport(reason)
    }

    fn finish(&mut self, reason: CloseReason) -> CloseReason {
        self.session.close(&reason);
        info!(area_id = self.session.area_id(), reason = %reason, "Connection closed");
        reason
    }
}

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        if self.session.state() != ConnectionState::Closed {
            warn!(
                area_id = self.session.area_id(),
                connection = %self.session.id(),
                "Connection task ended without closing"
            );
            self.session.close(&CloseReason::Aborted);
        }
    }
}

async fn send<S>(write: &mut S, message: &ClientMessage) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(message).map_err(|e| e.to_string())?;
    write.send(Message::Text(text)).await.map_err(|e| e.to_string())
}
