//! Frames and control directives flowing through a session pipeline

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::core::provider::{ProviderRole, ProviderService};

/// Data and control frames, processed downstream in submission order
#[derive(Debug, Clone)]
pub enum Frame {
    /// Initial control frame; its full traversal marks the pipeline as started
    Start,
    /// Raw microphone audio
    InputAudio {
        audio: Bytes,
        sample_rate: u32,
        num_channels: u16,
    },
    UserStartedSpeaking,
    UserSpeaking,
    UserStoppedSpeaking,
    /// Speech-to-text output fragment
    Transcription { text: String },
    /// Request to the language model with the active cleanup prompt
    LlmRequest { system_prompt: String, text: String },
    /// Language model output
    LlmText { text: String },
    /// Message destined for the client
    ClientMessage(serde_json::Value),
    Metrics(serde_json::Value),
    /// Terminal control frame; stops the pipeline
    End,
}

impl Frame {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Start => "StartFrame",
            Frame::InputAudio { .. } => "InputAudioRawFrame",
            Frame::UserStartedSpeaking => "UserStartedSpeakingFrame",
            Frame::UserSpeaking => "UserSpeakingFrame",
            Frame::UserStoppedSpeaking => "UserStoppedSpeakingFrame",
            Frame::Transcription { .. } => "TranscriptionFrame",
            Frame::LlmRequest { .. } => "LLMRequestFrame",
            Frame::LlmText { .. } => "LLMTextFrame",
            Frame::ClientMessage(_) => "ClientMessageFrame",
            Frame::Metrics(_) => "MetricsFrame",
            Frame::End => "EndFrame",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Start | Frame::End)
    }
}

/// Control message requesting a runtime change inside a running pipeline
pub enum Directive {
    /// Make `service` the active service of the `role` switcher
    SwitchService {
        role: ProviderRole,
        service: Arc<dyn ProviderService>,
        /// Completed once the switcher has applied the change
        ack: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::SwitchService { role, service, .. } => f
                .debug_struct("SwitchService")
                .field("role", role)
                .field("service", &service.id())
                .finish(),
        }
    }
}

/// Entry of a session's single logical queue
#[derive(Debug)]
pub enum PipelineItem {
    Frame(Frame),
    Directive(Directive),
}
