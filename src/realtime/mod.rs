//! Realtime voice stream: wire messages and the connection manager.
//!
//! The wire protocol is JSON text frames over one WebSocket. Outbound
//! traffic is microphone audio plus the periodic commit/response pair;
//! inbound traffic is the server event stream, of which only the audio
//! deltas feed playback.

pub mod connection;
pub mod messages;

pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use messages::{ApiError, ClientEvent, ServerEvent};
