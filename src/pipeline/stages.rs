//! Per-session pipeline stages
//!
//! Session layout, in order:
//! transport input, debug tap, STT switcher, debug tap, transcription buffer,
//! transcription-to-LLM converter, LLM switcher, LLM response converter,
//! text response logger, transport output.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use super::PipelineError;
use super::frames::{Directive, Frame};
use super::processor::FrameProcessor;
use super::runner::PipelineQueue;
use crate::core::prompt::default_prompt;
use crate::core::provider::{ProviderRole, ProviderService};
use crate::core::transport::ConnectionTransport;
use crate::gateway::{PromptConverter, ServiceSwitcher, TimingBuffer};

// ---------------------------------------------------------------------------
// Service switcher
// ---------------------------------------------------------------------------

/// Delegates frames to the role's active service; swaps it on a switch directive
pub struct ServiceSwitcherStage {
    role: ProviderRole,
    name: String,
    active: RwLock<Arc<dyn ProviderService>>,
}

impl ServiceSwitcherStage {
    pub fn new(role: ProviderRole, initial: Arc<dyn ProviderService>) -> Self {
        Self {
            role,
            name: format!("{role}-switcher"),
            active: RwLock::new(initial),
        }
    }

    pub fn active_id(&self) -> String {
        self.active.read().id().to_string()
    }
}

#[async_trait]
impl FrameProcessor for ServiceSwitcherStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        let service = self.active.read().clone();
        service.process_frame(frame).await
    }

    async fn handle_directive(&self, directive: Directive) -> Option<Directive> {
        match directive {
            Directive::SwitchService { role, service, ack } if role == self.role => {
                let previous = {
                    let mut active = self.active.write();
                    std::mem::replace(&mut *active, service)
                };
                info!(
                    role = %self.role,
                    from = previous.id(),
                    to = %self.active_id(),
                    "Switched active service"
                );
                let _ = ack.send(());
                None
            }
            other => Some(other),
        }
    }

    async fn cleanup(&self) -> Result<(), PipelineError> {
        let service = self.active.read().clone();
        service.close().await
    }
}

/// Gateway-facing handle that forwards switch requests through the pipeline queue
pub struct SwitcherHandle {
    role: ProviderRole,
    queue: PipelineQueue,
    stage: Arc<ServiceSwitcherStage>,
}

impl SwitcherHandle {
    pub fn new(role: ProviderRole, queue: PipelineQueue, stage: Arc<ServiceSwitcherStage>) -> Self {
        Self { role, queue, stage }
    }
}

#[async_trait]
impl ServiceSwitcher for SwitcherHandle {
    fn active_id(&self) -> String {
        self.stage.active_id()
    }

    async fn switch_to(&self, service: Arc<dyn ProviderService>) -> Result<(), PipelineError> {
        let (ack, acked) = oneshot::channel();
        self.queue.push_directive(Directive::SwitchService {
            role: self.role,
            service,
            ack,
        })?;
        acked.await.map_err(|_| PipelineError::DirectiveDropped)
    }
}

// ---------------------------------------------------------------------------
// Transcription buffer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BufferState {
    fragments: Vec<String>,
    speaking: bool,
    deadline: Option<Instant>,
}

/// Collects transcription fragments of one utterance.
///
/// The joined text is released once the user has stopped speaking and no new
/// fragment arrived for the configured timeout. Late fragments from slow STT
/// providers re-arm the timer.
pub struct TranscriptionBuffer {
    state: Mutex<BufferState>,
    timeout_seconds: RwLock<f64>,
}

impl TranscriptionBuffer {
    pub fn new(timeout_seconds: f64) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            timeout_seconds: RwLock::new(timeout_seconds),
        }
    }

    fn arm(&self, state: &mut BufferState) {
        let timeout = Duration::from_secs_f64(*self.timeout_seconds.read());
        state.deadline = Some(Instant::now() + timeout);
    }

    fn flush(state: &mut BufferState) -> Option<Frame> {
        state.deadline = None;
        let text = state
            .fragments
            .drain(..)
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(Frame::Transcription { text })
    }
}

#[async_trait]
impl FrameProcessor for TranscriptionBuffer {
    fn name(&self) -> &str {
        "transcription-buffer"
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        let mut state = self.state.lock();
        match frame {
            Frame::UserStartedSpeaking => {
                state.speaking = true;
                state.deadline = None;
                Ok(vec![frame])
            }
            Frame::UserStoppedSpeaking => {
                state.speaking = false;
                self.arm(&mut state);
                Ok(vec![frame])
            }
            Frame::Transcription { text } => {
                state.fragments.push(text);
                if !state.speaking {
                    self.arm(&mut state);
                }
                Ok(Vec::new())
            }
            Frame::End => {
                let mut out: Vec<Frame> = Self::flush(&mut state).into_iter().collect();
                out.push(Frame::End);
                Ok(out)
            }
            other => Ok(vec![other]),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }

    async fn on_deadline(&self) -> Result<Vec<Frame>, PipelineError> {
        let mut state = self.state.lock();
        let out: Vec<Frame> = Self::flush(&mut state).into_iter().collect();
        if let Some(Frame::Transcription { text }) = out.first() {
            debug!(%text, "Released buffered transcription");
        }
        Ok(out)
    }
}

impl TimingBuffer for TranscriptionBuffer {
    fn timeout_seconds(&self) -> f64 {
        *self.timeout_seconds.read()
    }

    fn set_timeout_seconds(&self, seconds: f64) {
        *self.timeout_seconds.write() = seconds;
        info!(timeout_seconds = seconds, "Transcription timeout updated");
    }
}

// ---------------------------------------------------------------------------
// Transcription to LLM
// ---------------------------------------------------------------------------

/// Turns a finished transcription into a cleanup request for the LLM
#[derive(Default)]
pub struct TranscriptionToLlm {
    custom_prompt: RwLock<Option<String>>,
}

impl TranscriptionToLlm {
    pub fn new() -> Self {
        Self::default()
    }

    fn system_prompt(&self) -> String {
        self.custom_prompt
            .read()
            .clone()
            .unwrap_or_else(default_prompt)
    }
}

#[async_trait]
impl FrameProcessor for TranscriptionToLlm {
    fn name(&self) -> &str {
        "transcription-to-llm"
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        match frame {
            Frame::Transcription { text } if text.trim().is_empty() => Ok(Vec::new()),
            Frame::Transcription { text } => Ok(vec![Frame::LlmRequest {
                system_prompt: self.system_prompt(),
                text,
            }]),
            other => Ok(vec![other]),
        }
    }
}

impl PromptConverter for TranscriptionToLlm {
    fn custom_prompt(&self) -> Option<String> {
        self.custom_prompt.read().clone()
    }

    fn set_custom_prompt(&self, prompt: Option<String>) {
        let custom = prompt.is_some();
        *self.custom_prompt.write() = prompt;
        info!(custom, "Cleanup prompt updated");
    }
}

// ---------------------------------------------------------------------------
// Output side
// ---------------------------------------------------------------------------

/// Wraps LLM output into the client message envelope
#[derive(Debug, Default)]
pub struct LlmResponseConverter;

#[async_trait]
impl FrameProcessor for LlmResponseConverter {
    fn name(&self) -> &str {
        "llm-response-converter"
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        match frame {
            Frame::LlmText { text } => Ok(vec![Frame::ClientMessage(json!({
                "type": "server-message",
                "data": { "text": text },
            }))]),
            other => Ok(vec![other]),
        }
    }
}

/// Logs the cleaned text on its way to the client
#[derive(Debug, Default)]
pub struct TextResponse;

#[async_trait]
impl FrameProcessor for TextResponse {
    fn name(&self) -> &str {
        "text-response"
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        if let Frame::ClientMessage(message) = &frame {
            let text = message
                .pointer("/data/text")
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            info!(%text, "Sending to client");
        }
        Ok(vec![frame])
    }
}

/// Pipeline sink: delivers client messages over the connection
pub struct TransportOutput {
    connection: Arc<dyn ConnectionTransport>,
}

impl TransportOutput {
    pub fn new(connection: Arc<dyn ConnectionTransport>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl FrameProcessor for TransportOutput {
    fn name(&self) -> &str {
        "transport-output"
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        match frame {
            Frame::ClientMessage(message) => {
                self.connection.send_message(message).await?;
                Ok(Vec::new())
            }
            control if control.is_control() => Ok(vec![control]),
            _ => Ok(Vec::new()),
        }
    }
}
