//! Error types for the voice session protocol.
//!
//! Every failure in the crate maps onto one of five kinds. Session-level
//! failures (config, transport, protocol, device) abort the current attempt
//! and surface a status message; decode failures are recovered locally by
//! the playback queue. Nothing here is fatal to the process.

use thiserror::Error;

/// Errors that can occur during a voice session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Required configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or socket failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected response shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio input or output device unavailable
    #[error("audio device error: {0}")]
    Device(String),

    /// Audio fragment could not be decoded
    #[error("audio decode error: {0}")]
    Decode(String),
}

/// Result type for voice session operations.
pub type VoiceResult<T> = Result<T, VoiceError>;
