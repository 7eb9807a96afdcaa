//! voxcall - realtime voice demo client and credential proxy.
//!
//! A user talks to a remote large-language-model voice endpoint: one binary
//! with a `serve` half (an axum proxy that mints short-lived session
//! credentials from a long-lived secret) and a `talk` half (microphone in,
//! synthesized replies out, over one WebSocket).
//!
//! # Architecture
//!
//! - `broker` - exchanges the secret for a short-lived session credential
//! - `realtime` - wire messages and the WebSocket connection manager
//! - `audio` - cpal capture, rodio playback, PCM16 conversion
//! - `session` - the per-toggle session object and its controller loop
//! - `proxy` - the credential-minting HTTP surface
//! - `config` / `error` - environment configuration and the failure taxonomy

pub mod audio;
pub mod broker;
pub mod config;
pub mod error;
pub mod proxy;
pub mod realtime;
pub mod session;

// Re-export commonly used items for convenience
pub use broker::CredentialBroker;
pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use realtime::{ClientEvent, Connection, ConnectionState, ServerEvent};
pub use session::{ControllerConfig, SessionController, SessionEvent, SessionStatus};
