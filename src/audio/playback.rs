//! Ordered playback of server audio fragments.
//!
//! Fragments arrive as base64 PCM16 deltas. Each is decoded when it is
//! enqueued, then played to completion in arrival order by a single drain
//! task. Dropping the pipeline closes the queue but lets already-queued
//! fragments finish, so the tail of a reply is not clipped.

use async_trait::async_trait;
use base64::prelude::*;
use rodio::buffer::SamplesBuffer;
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::pcm;
use crate::error::{VoiceError, VoiceResult};

/// Destination for decoded audio fragments.
///
/// `play` returns once the fragment has been rendered in full; the pipeline
/// relies on that to keep fragments strictly ordered.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Render one mono fragment to completion.
    async fn play(&self, samples: Vec<f32>) -> VoiceResult<()>;
}

// =============================================================================
// Rodio sink
// =============================================================================

struct SinkCmd {
    samples: Vec<f32>,
    done: oneshot::Sender<()>,
}

/// Plays fragments on the default output device via rodio.
///
/// The rodio `OutputStream` is not `Send`, so the device lives on a worker
/// thread; `play` hands the fragment over and waits for the worker's done
/// signal. The worker sleeps until each fragment ends, which serializes
/// playback without any further bookkeeping.
pub struct RodioSink {
    cmd_tx: std_mpsc::Sender<SinkCmd>,
}

impl RodioSink {
    /// Open the default output device, interpreting fragments as mono PCM
    /// at `sample_rate`. Blocks briefly until the worker reports ready.
    pub fn open(sample_rate: u32) -> VoiceResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        thread::spawn(move || run_sink(sample_rate, ready_tx, cmd_rx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!(sample_rate, "playback sink ready");
                Ok(Self { cmd_tx })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::Device(
                "playback thread exited before ready".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, samples: Vec<f32>) -> VoiceResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(SinkCmd {
                samples,
                done: done_tx,
            })
            .map_err(|_| VoiceError::Device("playback worker stopped".to_string()))?;
        done_rx
            .await
            .map_err(|_| VoiceError::Device("playback worker dropped fragment".to_string()))
    }
}

/// Worker body: own the output device and render fragments one at a time
/// until the command channel closes.
fn run_sink(
    sample_rate: u32,
    ready: std_mpsc::Sender<VoiceResult<()>>,
    cmds: std_mpsc::Receiver<SinkCmd>,
) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(VoiceError::Device(format!("no output device: {e}"))));
            return;
        }
    };
    let sink = match rodio::Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = ready.send(Err(VoiceError::Device(format!(
                "failed to open playback sink: {e}"
            ))));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    info!(sample_rate, "playback sink open");

    while let Ok(cmd) = cmds.recv() {
        sink.append(SamplesBuffer::new(1, sample_rate, cmd.samples));
        sink.sleep_until_end();
        let _ = cmd.done.send(());
    }
    // _stream drops here, releasing the device.
}

// =============================================================================
// Playback pipeline
// =============================================================================

/// FIFO queue of audio fragments drained by one task.
///
/// `enqueue` never blocks: a fragment that fails to decode is dropped with
/// a warning and playback continues with the next one. Dropping the
/// pipeline lets queued fragments drain naturally.
pub struct PlaybackPipeline {
    queue: mpsc::UnboundedSender<Vec<f32>>,
    drain: JoinHandle<()>,
}

impl PlaybackPipeline {
    /// Start the drain task over `sink`.
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let drain = tokio::spawn(async move {
            while let Some(samples) = rx.recv().await {
                if let Err(e) = sink.play(samples).await {
                    warn!(error = %e, "playback fragment failed");
                }
            }
            debug!("playback queue drained");
        });
        Self { queue, drain }
    }

    /// Decode a base64 PCM16 fragment and queue it for playback.
    pub fn enqueue(&self, delta: &str) {
        let bytes = match BASE64_STANDARD.decode(delta) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "audio fragment is not valid base64, dropped");
                return;
            }
        };
        let frame = match pcm::from_le_bytes(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "audio fragment dropped");
                return;
            }
        };
        if self.queue.send(pcm::decode(&frame)).is_err() {
            warn!("playback pipeline already closed, fragment dropped");
        }
    }

    /// Close the queue and wait for every queued fragment to finish.
    ///
    /// The session never calls this: ending a session must not block on the
    /// tail of a reply, so it drops the pipeline and the drain task finishes
    /// in the background. Await this where the drain has to be observed to
    /// completion, as the pipeline tests do.
    pub async fn close(self) {
        let PlaybackPipeline { queue, drain } = self;
        drop(queue);
        let _ = drain.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        played: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, samples: Vec<f32>) -> VoiceResult<()> {
            self.played.lock().unwrap().push(samples);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AudioSink for FailingSink {
        async fn play(&self, _samples: Vec<f32>) -> VoiceResult<()> {
            Err(VoiceError::Device("sink unavailable".to_string()))
        }
    }

    fn recording_pipeline() -> (PlaybackPipeline, Arc<Mutex<Vec<Vec<f32>>>>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            played: Arc::clone(&played),
        };
        (PlaybackPipeline::new(Box::new(sink)), played)
    }

    fn fragment(samples: &[i16]) -> String {
        BASE64_STANDARD.encode(pcm::to_le_bytes(samples))
    }

    #[tokio::test]
    async fn test_fragments_play_in_arrival_order() {
        let (pipeline, played) = recording_pipeline();
        pipeline.enqueue(&fragment(&[0, 16384]));
        pipeline.enqueue(&fragment(&[-32768]));
        pipeline.enqueue(&fragment(&[32767]));
        pipeline.close().await;

        let played = played.lock().unwrap();
        assert_eq!(played.len(), 3);
        assert!((played[0][1] - 16384.0 / 32767.0).abs() < 1e-6);
        assert!((played[1][0] + 1.0).abs() < 1e-6);
        assert!((played[2][0] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_invalid_base64_is_dropped() {
        let (pipeline, played) = recording_pipeline();
        pipeline.enqueue("not base64!!!");
        pipeline.enqueue(&fragment(&[1, 2, 3]));
        pipeline.close().await;

        let played = played.lock().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].len(), 3);
    }

    #[tokio::test]
    async fn test_odd_length_payload_is_dropped() {
        let (pipeline, played) = recording_pipeline();
        pipeline.enqueue(&BASE64_STANDARD.encode([0x01, 0x02, 0x03]));
        pipeline.close().await;

        assert!(played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_the_queue() {
        let pipeline = PlaybackPipeline::new(Box::new(FailingSink));
        pipeline.enqueue(&fragment(&[1]));
        pipeline.enqueue(&fragment(&[2]));
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_pending_fragments() {
        let (pipeline, played) = recording_pipeline();
        for i in 0..16 {
            pipeline.enqueue(&fragment(&[i]));
        }
        pipeline.close().await;
        assert_eq!(played.lock().unwrap().len(), 16);
    }
}
