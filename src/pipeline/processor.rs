//! Frame processor and observer traits

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info};

use super::PipelineError;
use super::frames::{Directive, Frame};

/// One stage of a session pipeline.
///
/// Stages are shared handles: the pipeline runtime drives them, while the
/// runtime-configuration gateway may hold the same stage to reconfigure it.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Process one frame, returning the frames to pass to the next stage
    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError>;

    /// Offer a directive to this stage. Return it to pass it downstream.
    async fn handle_directive(&self, directive: Directive) -> Option<Directive> {
        Some(directive)
    }

    /// Next instant at which [`FrameProcessor::on_deadline`] must run
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Called once the deadline has passed; emitted frames continue downstream
    async fn on_deadline(&self) -> Result<Vec<Frame>, PipelineError> {
        Ok(Vec::new())
    }

    /// Release resources when the session ends
    async fn cleanup(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Read-only per-frame callback invoked by the pipeline runtime
pub trait FrameObserver: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

/// Logs significant frames for troubleshooting.
///
/// Audio frames are logged for the first three and then every 500th.
/// `UserSpeaking` and metrics frames fire constantly and are skipped.
pub struct DebugFrameObserver {
    name: String,
    audio_frames: AtomicU64,
}

impl DebugFrameObserver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            audio_frames: AtomicU64::new(0),
        }
    }

    pub fn audio_frame_count(&self) -> u64 {
        self.audio_frames.load(Ordering::Relaxed)
    }
}

impl FrameObserver for DebugFrameObserver {
    fn on_frame(&self, frame: &Frame) {
        match frame {
            Frame::InputAudio {
                audio,
                sample_rate,
                num_channels,
            } => {
                let count = self.audio_frames.fetch_add(1, Ordering::Relaxed) + 1;
                if count <= 3 || count % 500 == 0 {
                    info!(
                        observer = %self.name,
                        count,
                        bytes = audio.len(),
                        sample_rate,
                        num_channels,
                        "Audio frame"
                    );
                }
            }
            Frame::Transcription { text } => {
                info!(observer = %self.name, %text, "Transcription");
            }
            Frame::UserStartedSpeaking => info!(observer = %self.name, "Speech started"),
            Frame::UserStoppedSpeaking => info!(observer = %self.name, "Speech stopped"),
            Frame::UserSpeaking | Frame::Metrics(_) => {}
            other => debug!(observer = %self.name, frame = other.name(), "Frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn audio() -> Frame {
        Frame::InputAudio {
            audio: Bytes::from_static(&[0u8; 320]),
            sample_rate: 16_000,
            num_channels: 1,
        }
    }

    #[test]
    fn test_debug_observer_counts_audio_only() {
        let observer = DebugFrameObserver::new("input");
        for _ in 0..5 {
            observer.on_frame(&audio());
        }
        observer.on_frame(&Frame::Transcription {
            text: "hello".into(),
        });
        observer.on_frame(&Frame::Metrics(serde_json::json!({})));
        assert_eq!(observer.audio_frame_count(), 5);
    }
}
