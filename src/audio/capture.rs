//! Microphone capture on a dedicated worker thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{VoiceError, VoiceResult};
use crate::session::SessionEvent;

/// Source of microphone audio for a session.
///
/// `start` opens the device and begins pushing fixed-size sample buffers
/// into the session event queue; `stop` tears the device down. Both are
/// idempotent. Tests substitute a scripted source for real hardware.
pub trait CaptureSource: Send {
    /// Open the device and start streaming buffers.
    fn start(&mut self) -> VoiceResult<()>;
    /// Stop streaming and release the device. No-op when not running.
    fn stop(&mut self);
}

/// Captures the default input device via CPAL.
///
/// The CPAL `Stream` is not `Send`, so the stream lives on a worker thread
/// for its whole life. `start` blocks briefly until the worker reports the
/// device opened; audio then flows from the CPAL callback straight into the
/// session event queue as `SessionEvent::CaptureBuffer`.
pub struct MicCapture {
    chunk_samples: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MicCapture {
    /// Create an idle capture that will emit buffers of `chunk_samples`
    /// mono samples into `events`.
    pub fn new(chunk_samples: usize, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            chunk_samples,
            events,
            stop_tx: None,
            worker: None,
        }
    }

    /// Whether the worker thread is live.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl CaptureSource for MicCapture {
    fn start(&mut self) -> VoiceResult<()> {
        if self.worker.is_some() {
            warn!("capture already running");
            return Ok(());
        }

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let chunk_samples = self.chunk_samples;
        let events = self.events.clone();

        let worker = thread::spawn(move || run_capture(chunk_samples, events, ready_tx, stop_rx));

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                debug!(rate, chunk_samples, "microphone capture started");
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(VoiceError::Device(
                    "capture thread exited before ready".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        // Dropping the stop sender releases the worker's blocking recv.
        self.stop_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("microphone capture stopped");
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker body: open the device, report readiness, then hold the stream
/// alive until the stop channel closes.
fn run_capture(
    chunk_samples: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
    ready: std_mpsc::Sender<VoiceResult<u32>>,
    stop: std_mpsc::Receiver<()>,
) {
    let (stream, rate) = match open_input_stream(chunk_samples, events) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(rate)).is_err() {
        return;
    }
    let _ = stop.recv();
    drop(stream);
}

/// Open the default input device at its native configuration, downmixing
/// to mono and accumulating fixed-size buffers in the CPAL callback.
fn open_input_stream(
    chunk_samples: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> VoiceResult<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::Device("no input device available".to_string()))?;

    let name = device.name().unwrap_or_else(|_| "unknown".to_string());
    let config: StreamConfig = device
        .default_input_config()
        .map_err(|e| VoiceError::Device(format!("failed to get input config: {e}")))?
        .into();

    let rate = config.sample_rate.0;
    let channels = config.channels as usize;
    info!(device = %name, rate, channels, "using input device");

    let mut pending: Vec<f32> = Vec::with_capacity(chunk_samples);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let sample = frame.iter().sum::<f32>() / channels as f32;
                    pending.push(sample);
                    if pending.len() >= chunk_samples {
                        if events
                            .send(SessionEvent::CaptureBuffer(pending.clone()))
                            .is_err()
                        {
                            // Session is gone; the stream outlives it only
                            // until the worker sees the stop channel close.
                            pending.clear();
                            return;
                        }
                        pending.clear();
                    }
                }
            },
            |err| warn!(error = %err, "microphone stream error"),
            None,
        )
        .map_err(|e| VoiceError::Device(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| VoiceError::Device(format!("failed to start input stream: {e}")))?;

    Ok((stream, rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_without_start_is_noop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut capture = MicCapture::new(4096, tx);
        assert!(!capture.is_running());
        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
    }

    #[test]
    fn test_capture_lifecycle() {
        // Hosts without an input device (CI) report a device error instead.
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut capture = MicCapture::new(4096, tx);
        match capture.start() {
            Ok(()) => {
                assert!(capture.is_running());
                capture.stop();
                assert!(!capture.is_running());
            }
            Err(e) => assert!(matches!(e, VoiceError::Device(_))),
        }
    }
}
