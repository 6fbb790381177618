//! Mock realtime WebSocket endpoint
//!
//! Provides a [`MockRealtimeServer`] that speaks the server side of the
//! `graphql-ws` protocol: it acknowledges `connection_init`, answers
//! `start` with `start_ack` and scripted data, and `stop` with `complete`.
//! Every client frame is recorded for assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

/// How the mock server reacts to a client
#[derive(Debug, Clone)]
pub struct RealtimeBehavior {
    /// Send `connection_ack` after `connection_init`
    pub send_ack: bool,
    /// `connectionTimeoutMs` in the ack; `None` sends an ack without payload
    pub connection_timeout_ms: Option<u64>,
    /// Send `ka` at this period once acknowledged
    pub keepalive_every: Option<Duration>,
    /// Data payloads pushed right after `start_ack`
    pub data_payloads: Vec<Value>,
    /// Answer `stop` with `complete`
    pub complete_on_stop: bool,
    /// Answer `start` with an `error` frame instead of `start_ack`
    pub error_after_start: bool,
}

impl Default for RealtimeBehavior {
    fn default() -> Self {
        Self {
            send_ack: true,
            connection_timeout_ms: Some(300_000),
            keepalive_every: None,
            data_payloads: Vec::new(),
            complete_on_stop: true,
            error_after_start: false,
        }
    }
}

#[derive(Default)]
struct Recorded {
    frames: Mutex<Vec<Value>>,
    uris: Mutex<Vec<String>>,
    protocols: Mutex<Vec<String>>,
    connections: AtomicUsize,
    closed: AtomicUsize,
}

impl Recorded {
    fn push<T>(slot: &Mutex<Vec<T>>, value: T) {
        slot.lock().unwrap_or_else(|e| e.into_inner()).push(value);
    }

    fn snapshot<T: Clone>(slot: &Mutex<Vec<T>>) -> Vec<T> {
        slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Mock realtime server bound to an ephemeral local port
///
/// # Example
///
/// ```rust,ignore
/// use occupancy_test_utils::{MockRealtimeServer, RealtimeBehavior};
///
/// #[tokio::test]
/// async fn test_subscribe() {
///     let server = MockRealtimeServer::start(RealtimeBehavior::default()).await;
///     // Point ApiConfig::with_realtime_url at server.url()
///     server.wait_for_frames("start", 1, Duration::from_secs(5)).await;
/// }
/// ```
pub struct MockRealtimeServer {
    url: String,
    recorded: Arc<Recorded>,
    accept_task: JoinHandle<()>,
}

impl MockRealtimeServer {
    pub async fn start(behavior: RealtimeBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock realtime listener");
        let addr = listener.local_addr().expect("mock realtime address");
        let recorded = Arc::new(Recorded::default());

        let accept_recorded = Arc::clone(&recorded);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior.clone(), Arc::clone(&accept_recorded)));
            }
        });

        Self {
            url: format!("ws://{}/graphql", addr),
            recorded,
            accept_task,
        }
    }

    /// WebSocket URL to use as the realtime override
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Every client frame received, across connections
    pub fn frames(&self) -> Vec<Value> {
        Recorded::snapshot(&self.recorded.frames)
    }

    /// Received frames with the given `type`
    pub fn frames_of_type(&self, frame_type: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["type"] == frame_type)
            .collect()
    }

    /// Request URIs of accepted upgrades (path and query)
    pub fn request_uris(&self) -> Vec<String> {
        Recorded::snapshot(&self.recorded.uris)
    }

    /// `Sec-WebSocket-Protocol` values offered by clients
    pub fn offered_protocols(&self) -> Vec<String> {
        Recorded::snapshot(&self.recorded.protocols)
    }

    pub fn connection_count(&self) -> usize {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    /// Connections that have ended, either side closing
    pub fn closed_count(&self) -> usize {
        self.recorded.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames of `frame_type` arrived
    pub async fn wait_for_frames(&self, frame_type: &str, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.frames_of_type(frame_type).len() >= count).await
    }

    /// Wait until at least `count` connections have ended
    pub async fn wait_for_closed(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.closed_count() >= count).await
    }
}

impl Drop for MockRealtimeServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn next_keepalive(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn serve(stream: TcpStream, behavior: RealtimeBehavior, recorded: Arc<Recorded>) {
    let handshake_recorded = Arc::clone(&recorded);
    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        Recorded::push(&handshake_recorded.uris, request.uri().to_string());
        if let Some(protocol) = request.headers().get("Sec-WebSocket-Protocol") {
            Recorded::push(
                &handshake_recorded.protocols,
                protocol.to_str().unwrap_or_default().to_string(),
            );
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));
        }
        Ok(response)
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    recorded.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws.split();
    let mut keepalive: Option<Interval> = None;

    loop {
        let replies = tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    Recorded::push(&recorded.frames, frame.clone());
                    respond(&frame, &behavior, &mut keepalive)
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            _ = next_keepalive(&mut keepalive) => vec![json!({"type": "ka"})],
        };

        for reply in replies {
            if write.send(Message::Text(reply.to_string())).await.is_err() {
                recorded.closed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        }
    }

    recorded.closed.fetch_add(1, Ordering::SeqCst);
}

fn respond(frame: &Value, behavior: &RealtimeBehavior, keepalive: &mut Option<Interval>) -> Vec<Value> {
    let id = frame["id"].clone();
    match frame["type"].as_str() {
        Some("connection_init") if behavior.send_ack => {
            if let Some(every) = behavior.keepalive_every {
                *keepalive = Some(interval_at(Instant::now() + every, every));
            }
            let ack = match behavior.connection_timeout_ms {
                Some(ms) => json!({"type": "connection_ack", "payload": {"connectionTimeoutMs": ms}}),
                None => json!({"type": "connection_ack"}),
            };
            vec![ack]
        }
        Some("start") if behavior.error_after_start => vec![json!({
            "type": "error",
            "id": id,
            "payload": {"errors": [{"errorType": "UnauthorizedException", "message": "Permission denied"}]}
        })],
        Some("start") => {
            let mut replies = vec![json!({"type": "start_ack", "id": id})];
            replies.extend(
                behavior
                    .data_payloads
                    .iter()
                    .map(|payload| json!({"type": "data", "id": id, "payload": payload})),
            );
            replies
        }
        Some("stop") if behavior.complete_on_stop => vec![json!({"type": "complete", "id": id})],
        _ => Vec::new(),
    }
}
