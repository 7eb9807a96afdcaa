//! WebSocket message types for the realtime voice stream.
//!
//! All events are JSON-encoded text frames.
//!
//! Client events (sent to server):
//! - input_audio_buffer.append - Append captured audio to the input buffer
//! - input_audio_buffer.commit - Commit the input buffer for inference
//! - response.create - Ask the model to respond
//!
//! Server events (received from server):
//! - response.audio.delta - Synthesized audio chunk (the only event with
//!   required semantics; everything else is logged, never interpreted)
//! - error - Error reported by the service
//! - session.created / input_audio_buffer.committed / response.created /
//!   response.audio.done / response.done - lifecycle notifications
//! - anything else deserializes to `Other`

use serde::{Deserialize, Serialize};

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent over the realtime stream.
///
/// Audio frames carry the int16 samples as a JSON array, matching the wire
/// contract of the demo service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Append a frame of 16-bit PCM samples to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Converted capture samples
        audio: Vec<i16>,
    },

    /// Commit the input audio buffer
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Ask the model to generate a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from a converted frame.
    pub fn append(frame: Vec<i16>) -> Self {
        ClientEvent::InputAudioBufferAppend { audio: frame }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received over the realtime stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error reported by the service
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated,

    /// Input audio buffer committed
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted,

    /// Response generation started
    #[serde(rename = "response.created")]
    ResponseCreated,

    /// Synthesized audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded PCM16 fragment
        delta: String,
    },

    /// Audio generation complete
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Any event type this client does not interpret
    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Event type name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Error { .. } => "error",
            ServerEvent::SessionCreated => "session.created",
            ServerEvent::InputAudioBufferCommitted => "input_audio_buffer.committed",
            ServerEvent::ResponseCreated => "response.created",
            ServerEvent::AudioDelta { .. } => "response.audio.delta",
            ServerEvent::AudioDone => "response.audio.done",
            ServerEvent::ResponseDone => "response.done",
            ServerEvent::Other => "unknown",
        }
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Error payload carried by an `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    /// Error code
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_serialization() {
        let event = ClientEvent::append(vec![0, -1, 32767, -32768]);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"input_audio_buffer.append","audio":[0,-1,32767,-32768]}"#
        );
    }

    #[test]
    fn test_commit_serialization() {
        let json = serde_json::to_string(&ClientEvent::InputAudioBufferCommit).unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.commit"}"#);
    }

    #[test]
    fn test_response_create_serialization() {
        let json = serde_json::to_string(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_audio_delta_deserialization() {
        let json = r#"{
            "type": "response.audio.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "AAABAA=="
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::AudioDelta { delta } => assert_eq!(delta, "AAABAA=="),
            other => panic!("wrong event type: {}", other.kind()),
        }
    }

    #[test]
    fn test_error_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "code": "input_audio_buffer_commit_empty",
                "message": "buffer too small"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "buffer too small");
                assert_eq!(
                    error.code.as_deref(),
                    Some("input_audio_buffer_commit_empty")
                );
            }
            other => panic!("wrong event type: {}", other.kind()),
        }
    }

    #[test]
    fn test_lifecycle_event_ignores_payload() {
        let json = r#"{"type":"session.created","event_id":"ev_1","session":{"id":"sess_1"}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::SessionCreated));
    }

    #[test]
    fn test_unknown_event_maps_to_other() {
        let json = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::Other));
        assert_eq!(event.kind(), "unknown");
    }
}
