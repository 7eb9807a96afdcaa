//! Audio capture, playback, and PCM16 conversion.
//!
//! Device streams are not `Send`, so both capture and playback own their
//! device handles on dedicated OS threads and talk to the async session
//! through channels. The `CaptureSource` and `AudioSink` traits are the
//! seams where tests substitute scripted audio for real hardware.

pub mod capture;
pub mod pcm;
pub mod playback;

pub use capture::{CaptureSource, MicCapture};
pub use playback::{AudioSink, PlaybackPipeline, RodioSink};
