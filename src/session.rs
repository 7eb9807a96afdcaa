//! Session controller: one cooperative loop driving the whole demo.
//!
//! Every ordering-sensitive decision happens here. Capture threads, the
//! socket I/O task and the user's toggle all feed a single `SessionEvent`
//! queue; the controller drains it one event at a time, so the ordering
//! guarantees of the protocol hold without any shared mutable state.
//!
//! A `Session` is built fresh on each toggle-on and dropped on toggle-off;
//! nothing survives between sessions except the controller itself.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::capture::CaptureSource;
use crate::audio::pcm;
use crate::audio::playback::{AudioSink, PlaybackPipeline};
use crate::broker::CredentialBroker;
use crate::config::Config;
use crate::error::VoiceResult;
use crate::realtime::connection::{Connection, ConnectionConfig};
use crate::realtime::messages::{ClientEvent, ServerEvent};

// =============================================================================
// Events and status
// =============================================================================

/// Everything that can happen to a session, in one queue.
#[derive(Debug)]
pub enum SessionEvent {
    /// The user's start/stop action
    Toggle,
    /// A fixed-size buffer of captured microphone samples
    CaptureBuffer(Vec<f32>),
    /// A parsed event from the remote voice service
    Server(ServerEvent),
    /// The remote stream ended without a local close
    LinkClosed {
        /// Close reason reported by the transport, if any
        reason: Option<String>,
    },
    /// Stop any active session and exit the controller loop
    Shutdown,
}

/// User-visible session status, published through a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// No session; ready for a toggle
    Idle,
    /// Minting a credential
    RequestingCredential,
    /// Opening the realtime stream
    Connecting,
    /// Streaming microphone audio; replies play back
    Live,
    /// The session ended (toggle-off or remote close)
    Ended,
    /// A session attempt failed; back to idle
    Failed(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Ready."),
            SessionStatus::RequestingCredential => write!(f, "Requesting session credential..."),
            SessionStatus::Connecting => write!(f, "Connecting..."),
            SessionStatus::Live => write!(
                f,
                "Session live. Speak and pause; replies play back automatically."
            ),
            SessionStatus::Ended => write!(f, "Session ended."),
            SessionStatus::Failed(reason) => write!(f, "Session failed: {reason}"),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Everything owned by one toggle-on: the connection, the capture source
/// and the playback pipeline. Dropped as a unit on toggle-off; playback
/// drains whatever is still queued.
struct Session {
    id: Uuid,
    connection: Connection,
    capture: Box<dyn CaptureSource>,
    playback: PlaybackPipeline,
}

// =============================================================================
// Controller
// =============================================================================

/// Builds a capture source wired into the given event queue.
pub type CaptureFactory =
    Box<dyn Fn(mpsc::UnboundedSender<SessionEvent>) -> Box<dyn CaptureSource> + Send>;

/// Opens the playback sink. Fails with `Device` when no output exists.
pub type SinkFactory = Box<dyn Fn() -> VoiceResult<Box<dyn AudioSink>> + Send>;

/// Tuning for the sessions a controller creates.
pub struct ControllerConfig {
    /// Realtime connection parameters.
    pub connection: ConnectionConfig,
}

impl From<&Config> for ControllerConfig {
    fn from(config: &Config) -> Self {
        Self {
            connection: ConnectionConfig {
                realtime_url: config.realtime_url.clone(),
                model: config.model.clone(),
                commit_interval: config.commit_interval(),
            },
        }
    }
}

/// Drives sessions in response to the event queue.
///
/// At most one session is active at a time; the toggle is the only entry
/// point. The factories are the hardware seam: the binary passes cpal and
/// rodio constructors, tests pass scripted sources and recording sinks.
pub struct SessionController {
    broker: CredentialBroker,
    config: ControllerConfig,
    capture_factory: CaptureFactory,
    sink_factory: SinkFactory,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
    session: Option<Session>,
}

impl SessionController {
    /// Create a controller and the status watch for its user interface.
    pub fn new(
        broker: CredentialBroker,
        config: ControllerConfig,
        capture_factory: CaptureFactory,
        sink_factory: SinkFactory,
    ) -> (Self, watch::Receiver<SessionStatus>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
        let controller = Self {
            broker,
            config,
            capture_factory,
            sink_factory,
            events_tx,
            events_rx,
            status_tx,
            session: None,
        };
        (controller, status_rx)
    }

    /// Sender half of the event queue, for toggles and injected events.
    pub fn handle(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events_tx.clone()
    }

    /// Drain the event queue until `Shutdown` or every sender is gone.
    pub async fn run(mut self) {
        let mut pending: VecDeque<SessionEvent> = VecDeque::new();
        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => match self.events_rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                SessionEvent::Toggle => {
                    self.handle_toggle().await;
                    // A toggle queued while the transition ran would undo it
                    // the instant it completed; those are discarded, anything
                    // else is replayed in order.
                    let mut discarded = 0usize;
                    while let Ok(queued) = self.events_rx.try_recv() {
                        if matches!(queued, SessionEvent::Toggle) {
                            discarded += 1;
                        } else {
                            pending.push_back(queued);
                        }
                    }
                    if discarded > 0 {
                        debug!(discarded, "discarded toggles queued during transition");
                    }
                }
                SessionEvent::CaptureBuffer(buffer) => self.handle_capture(buffer),
                SessionEvent::Server(event) => self.handle_server(event),
                SessionEvent::LinkClosed { reason } => self.handle_link_closed(reason),
                SessionEvent::Shutdown => {
                    self.stop_session().await;
                    break;
                }
            }
        }
        debug!("session controller stopped");
    }

    /// Start a session if none is active, end the active one otherwise.
    async fn handle_toggle(&mut self) {
        if self.session.is_some() {
            self.stop_session().await;
            self.set_status(SessionStatus::Ended);
        } else {
            self.start_session().await;
        }
    }

    /// The toggle-on path: credential, sink, connection, capture — in that
    /// order, so a failure at any step leaves nothing behind to tear down
    /// except what this function closes itself.
    async fn start_session(&mut self) {
        self.set_status(SessionStatus::RequestingCredential);
        let credential = match self.broker.request_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "credential request failed");
                self.set_status(SessionStatus::Failed(e.to_string()));
                return;
            }
        };

        let sink = match (self.sink_factory)() {
            Ok(sink) => sink,
            Err(e) => {
                warn!(error = %e, "playback sink unavailable");
                self.set_status(SessionStatus::Failed(e.to_string()));
                return;
            }
        };
        let playback = PlaybackPipeline::new(sink);

        self.set_status(SessionStatus::Connecting);
        let mut connection = Connection::new();
        if let Err(e) = connection
            .connect(&credential, &self.config.connection, self.events_tx.clone())
            .await
        {
            warn!(error = %e, "connection failed");
            self.set_status(SessionStatus::Failed(e.to_string()));
            return;
        }

        // The ready signal: the connection is open, capture may start.
        let mut capture = (self.capture_factory)(self.events_tx.clone());
        if let Err(e) = capture.start() {
            warn!(error = %e, "capture failed to start");
            connection.close().await;
            self.set_status(SessionStatus::Failed(e.to_string()));
            return;
        }

        let id = Uuid::new_v4();
        info!(session = %id, "session live");
        self.session = Some(Session {
            id,
            connection,
            capture,
            playback,
        });
        self.set_status(SessionStatus::Live);
    }

    /// The toggle-off path: close the stream, stop capture, drop the
    /// session. Queued playback drains naturally after the drop.
    async fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.connection.close().await;
            session.capture.stop();
            info!(session = %session.id, "session ended");
        }
    }

    /// Convert a capture buffer and send it down the wire. Buffers that
    /// outlive their session are dropped, matching best-effort live audio.
    fn handle_capture(&mut self, buffer: Vec<f32>) {
        let Some(session) = &self.session else {
            debug!(samples = buffer.len(), "capture buffer with no session, dropped");
            return;
        };
        session
            .connection
            .send(ClientEvent::append(pcm::encode(&buffer)));
    }

    /// Dispatch a server event. Only the audio delta is interpreted;
    /// everything else is logged and passed over.
    fn handle_server(&mut self, event: ServerEvent) {
        let Some(session) = &self.session else {
            debug!(kind = event.kind(), "server event with no session, dropped");
            return;
        };
        match event {
            ServerEvent::AudioDelta { delta } => session.playback.enqueue(&delta),
            ServerEvent::Error { error } => warn!(
                session = %session.id,
                code = error.code.as_deref().unwrap_or("unknown"),
                message = %error.message,
                "service reported an error"
            ),
            other => debug!(session = %session.id, kind = other.kind(), "server event"),
        }
    }

    /// The remote side ended the stream: release capture and drop the
    /// session. Not a crash; the controller is ready for a new toggle.
    fn handle_link_closed(&mut self, reason: Option<String>) {
        let Some(mut session) = self.session.take() else {
            debug!("link closed with no session");
            return;
        };
        warn!(session = %session.id, reason = ?reason, "remote side closed the stream");
        session.capture.stop();
        session.connection.mark_closed();
        self.set_status(SessionStatus::Ended);
    }

    fn set_status(&self, status: SessionStatus) {
        debug!(status = %status, "session status");
        self.status_tx.send_replace(status);
    }
}

// =============================================================================
// Tests
// =============================================================================
