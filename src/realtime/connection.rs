//! Connection manager for the realtime voice stream.
//!
//! One `Connection` owns one WebSocket. The lifecycle is
//! `idle -> connecting -> open -> {closing -> closed, error}`; at most one
//! connection exists per session and a closed connection is never reused.
//!
//! All socket I/O happens on a single spawned task that multiplexes the
//! outbound event channel, the inbound stream, and the periodic
//! commit/response timer. Inbound events and unsolicited closure are
//! reported through the session event queue; the session loop owns every
//! state transition that is not part of `connect`/`close` themselves.

use std::fmt;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{VoiceError, VoiceResult};
use crate::realtime::messages::{ClientEvent, ServerEvent};
use crate::session::SessionEvent;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle states of a realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attempt yet
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    /// Connected and ready to stream
    Open,
    /// Local close in progress
    Closing,
    /// Cleanly closed
    Closed,
    /// Handshake or transport failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Failed => write!(f, "error"),
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Parameters for opening a realtime connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Streaming endpoint; the model is appended as a query parameter.
    pub realtime_url: Url,
    /// Model name presented on the stream URL.
    pub model: String,
    /// Period of the commit/response timer while open.
    pub commit_interval: Duration,
}

/// One bidirectional stream to the remote voice service.
pub struct Connection {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    io_task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Create an idle connection.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            outbound: None,
            io_task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether `send` will reach the wire.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Open the stream, presenting the short-lived credential.
    ///
    /// Valid only from `idle`; a connection that is already open is left
    /// alone, and a closed or failed one cannot be reused. On success the
    /// state is `open` and the I/O task is running; the `Ok` return is the
    /// ready signal that capture may start. On failure the state is `error`
    /// and the session attempt ends.
    pub async fn connect(
        &mut self,
        credential: &str,
        config: &ConnectionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> VoiceResult<()> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Connecting | ConnectionState::Open => return Ok(()),
            other => {
                return Err(VoiceError::Transport(format!(
                    "connection cannot be reused from state {other}"
                )));
            }
        }
        self.state = ConnectionState::Connecting;

        let url = build_stream_url(&config.realtime_url, &config.model);
        let host = match (config.realtime_url.host_str(), config.realtime_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                self.state = ConnectionState::Failed;
                return Err(VoiceError::Config(format!(
                    "realtime URL {} has no host",
                    config.realtime_url
                )));
            }
        };

        let request = http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {credential}"))
            .header("OpenAI-Beta", "realtime=v1")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| {
                self.state = ConnectionState::Failed;
                VoiceError::Transport(format!("invalid upgrade request: {e}"))
            })?;

        let (ws, _response) = match connect_async(request).await {
            Ok(pair) => pair,
            Err(e) => {
                self.state = ConnectionState::Failed;
                return Err(VoiceError::Transport(format!(
                    "realtime handshake failed: {e}"
                )));
            }
        };

        debug!(url = %url, "realtime connection open");

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel::<ClientEvent>();
        let handle = tokio::spawn(run_io(sink, stream, rx, events, config.commit_interval));

        self.outbound = Some(tx);
        self.io_task = Some(handle);
        self.state = ConnectionState::Open;
        Ok(())
    }

    /// Forward a client event to the wire.
    ///
    /// Valid only while `open`; in any other state the event is silently
    /// dropped, not queued. Live audio is best-effort.
    pub fn send(&self, event: ClientEvent) {
        if self.state != ConnectionState::Open {
            trace!(state = %self.state, "dropping outbound event, connection not open");
            return;
        }
        if let Some(tx) = &self.outbound
            && tx.send(event).is_err()
        {
            trace!("outbound channel closed, event dropped");
        }
    }

    /// Close the stream and wait for the I/O task to finish.
    ///
    /// Valid from `connecting` or `open`; a no-op anywhere else. Dropping
    /// the outbound channel makes the I/O task send a Close frame and exit.
    pub async fn close(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::Closing;
                self.outbound = None;
                if let Some(task) = self.io_task.take() {
                    let _ = task.await;
                }
                self.state = ConnectionState::Closed;
                info!("realtime connection closed");
            }
            other => debug!(state = %other, "close ignored"),
        }
    }

    /// Record an ending the remote side initiated. The I/O task has already
    /// exited when this is called from the session loop.
    pub fn mark_closed(&mut self) {
        self.outbound = None;
        self.io_task = None;
        self.state = ConnectionState::Closed;
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the model parameter to the stream URL, preserving any query an
/// endpoint override already carries.
fn build_stream_url(realtime_url: &Url, model: &str) -> Url {
    let mut url = realtime_url.clone();
    url.query_pairs_mut().append_pair("model", model);
    url
}

// =============================================================================
// Socket I/O task
// =============================================================================

/// Multiplex the socket until either side ends the stream.
///
/// Local close is signalled by the outbound channel closing; that path sends
/// a Close frame and exits without notifying the session (the session
/// initiated it). Remote close and transport errors push a `LinkClosed`
/// event into the session queue.
async fn run_io(
    mut sink: WsSink,
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commit_interval: Duration,
) {
    // First flush lands one full period after open, not immediately.
    let start = tokio::time::Instant::now() + commit_interval;
    let mut flush = tokio::time::interval_at(start, commit_interval);

    let reason: Option<String> = loop {
        tokio::select! {
            maybe_event = outbound.recv() => {
                let Some(event) = maybe_event else {
                    // Session dropped the sender: clean local close.
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    return;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize client event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    break Some(format!("send failed: {e}"));
                }
            }

            maybe_msg = stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if events.send(SessionEvent::Server(event)).is_err() {
                                    // Session loop is gone; nothing left to do.
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "unparseable server event"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            break Some(format!("pong failed: {e}"));
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(format!("stream error: {e}")),
                    None => break None,
                }
            }

            _ = flush.tick() => {
                if let Err(e) = sink.send(client_text(&ClientEvent::InputAudioBufferCommit)).await {
                    break Some(format!("commit failed: {e}"));
                }
                if let Err(e) = sink.send(client_text(&ClientEvent::ResponseCreate)).await {
                    break Some(format!("response request failed: {e}"));
                }
            }
        }
    };

    debug!(reason = ?reason, "realtime stream ended");
    let _ = events.send(SessionEvent::LinkClosed { reason });
}

/// Serialize a parameterless client event into a text frame.
fn client_text(event: &ClientEvent) -> Message {
    // Unit variants cannot fail to serialize.
    let json = serde_json::to_string(event).unwrap_or_default();
    Message::Text(json.into())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: &str) -> ConnectionConfig {
        ConnectionConfig {
            realtime_url: Url::parse(url).unwrap(),
            model: "gpt-4o-realtime-preview".to_string(),
            commit_interval: Duration::from_millis(1400),
        }
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = Connection::new();
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert!(!conn.is_open());
    }

    #[test]
    fn test_send_outside_open_is_silently_dropped() {
        let conn = Connection::new();
        // Must not panic and must not change state.
        conn.send(ClientEvent::append(vec![1, 2, 3]));
        conn.send(ClientEvent::InputAudioBufferCommit);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_close_outside_open_is_noop() {
        let mut conn = Connection::new();
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_error() {
        // Bind then drop a listener to get a port nothing is listening on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new();
        let err = conn
            .connect(
                "ek_test",
                &test_config(&format!("ws://127.0.0.1:{port}/realtime")),
                events_tx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Transport(_)));
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(conn.state().to_string(), "error");
    }

    #[tokio::test]
    async fn test_failed_connection_cannot_be_reused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new();
        let config = test_config(&format!("ws://127.0.0.1:{port}/realtime"));
        let _ = conn.connect("ek_test", &config, events_tx.clone()).await;
        let err = conn.connect("ek_test", &config, events_tx).await.unwrap_err();
        assert!(err.to_string().contains("cannot be reused"));
    }

    #[test]
    fn test_stream_url_appends_model() {
        let url = build_stream_url(
            &Url::parse("wss://api.openai.com/v1/realtime").unwrap(),
            "gpt-4o-realtime-preview",
        );
        assert_eq!(
            url.as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
    }

    #[test]
    fn test_stream_url_preserves_override_query() {
        let url = build_stream_url(
            &Url::parse("ws://127.0.0.1:9000/realtime?token=abc").unwrap(),
            "gpt-4o-realtime-preview",
        );
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/realtime?token=abc&model=gpt-4o-realtime-preview"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
        assert_eq!(ConnectionState::Failed.to_string(), "error");
    }
}
