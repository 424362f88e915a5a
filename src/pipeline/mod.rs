//! Session pipeline runtime
//!
//! A pipeline is an ordered list of [`FrameProcessor`] stages fed from a
//! single queue. The runtime pushes a start frame through every stage before
//! consuming the queue and reports that observation through a callback; the
//! session manager uses it to signal readiness.

pub mod frames;
pub mod processor;
pub mod runner;
pub mod stages;

pub use frames::{Directive, Frame, PipelineItem};
pub use processor::{DebugFrameObserver, FrameObserver, FrameProcessor};
pub use runner::{Pipeline, PipelineQueue};
pub use stages::{
    LlmResponseConverter, ServiceSwitcherStage, SwitcherHandle, TextResponse,
    TranscriptionBuffer, TranscriptionToLlm, TransportOutput,
};

use crate::core::transport::TransportError;

/// Pipeline and stage errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline is no longer consuming its queue
    #[error("Pipeline queue closed")]
    QueueClosed,

    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// A stage swallowed the start frame
    #[error("Start frame did not pass stage '{0}'")]
    StartNotPropagated(String),

    /// A directive was dropped before any stage acknowledged it
    #[error("Directive was not acknowledged by the pipeline")]
    DirectiveDropped,

    /// A backend service failed
    #[error("Service '{service}' failed: {message}")]
    Service { service: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
