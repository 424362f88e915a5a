//! Runtime configuration gateway
//!
//! Mediates every runtime reconfiguration request: prompt sections, the
//! speech-recognition timeout and provider switches. Requests are delegated to
//! the collaborators registered by the most recently started session.
//!
//! Provider switches wait for the readiness gate before they are validated and
//! forwarded, so a switch requested while a pipeline is still starting is
//! applied once the pipeline consumes frames. The readiness wait has no
//! timeout.
//!
//! Two concurrent switches for the same role are not serialized: whichever
//! switcher acknowledgment completes last determines the committed selection.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::is_valid_stt_timeout;
use crate::core::catalog::{ProviderCatalog, ProviderOption};
use crate::core::prompt::{DefaultPromptSections, PromptSections, combine_prompt_sections};
use crate::core::provider::{ProviderRole, ProviderService};
use crate::core::readiness::ReadinessGate;
use crate::pipeline::PipelineError;

/// Live prompt converter of a session
pub trait PromptConverter: Send + Sync {
    fn custom_prompt(&self) -> Option<String>;
    fn set_custom_prompt(&self, prompt: Option<String>);
}

/// Live transcription timing buffer of a session
pub trait TimingBuffer: Send + Sync {
    fn timeout_seconds(&self) -> f64;
    fn set_timeout_seconds(&self, seconds: f64);
}

/// Live service switcher of a session
#[async_trait]
pub trait ServiceSwitcher: Send + Sync {
    /// Id of the service currently receiving frames
    fn active_id(&self) -> String;

    /// Forward a switch directive and wait for the pipeline to apply it
    async fn switch_to(&self, service: Arc<dyn ProviderService>) -> Result<(), PipelineError>;
}

/// Collaborators a session registers with the gateway
#[derive(Clone)]
pub struct SessionCollaborators {
    pub prompt_converter: Arc<dyn PromptConverter>,
    pub timing_buffer: Arc<dyn TimingBuffer>,
    pub stt_switcher: Arc<dyn ServiceSwitcher>,
    pub llm_switcher: Arc<dyn ServiceSwitcher>,
}

impl SessionCollaborators {
    pub fn switcher(&self, role: ProviderRole) -> &Arc<dyn ServiceSwitcher> {
        match role {
            ProviderRole::Stt => &self.stt_switcher,
            ProviderRole::Llm => &self.llm_switcher,
        }
    }
}

/// Current provider id per role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveSelection {
    pub stt: Option<String>,
    pub llm: Option<String>,
}

impl ActiveSelection {
    pub fn get(&self, role: ProviderRole) -> Option<&str> {
        match role {
            ProviderRole::Stt => self.stt.as_deref(),
            ProviderRole::Llm => self.llm.as_deref(),
        }
    }

    fn set(&mut self, role: ProviderRole, id: String) {
        match role {
            ProviderRole::Stt => self.stt = Some(id),
            ProviderRole::Llm => self.llm = Some(id),
        }
    }
}

/// Available providers per role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableProviders {
    pub stt: Vec<ProviderOption>,
    pub llm: Vec<ProviderOption>,
}

/// Expected failures of runtime configuration requests
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No session has registered the named collaborator yet
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    #[error("Provider '{provider}' not available (no API key configured)")]
    NotAvailable { role: ProviderRole, provider: String },

    #[error("Timeout must be between 0.1 and 10.0 seconds")]
    OutOfRange(f64),

    /// The pipeline did not acknowledge the switch directive
    #[error("Failed to switch {role} provider: {message}")]
    SwitchFailed { role: ProviderRole, message: String },
}

const PROMPT_CONVERTER: &str = "LLM converter";
const TIMING_BUFFER: &str = "Transcription buffer";

fn switcher_name(role: ProviderRole) -> &'static str {
    match role {
        ProviderRole::Stt => "STT switcher",
        ProviderRole::Llm => "LLM switcher",
    }
}

/// Runtime configuration gateway
pub struct RuntimeConfigGateway {
    catalog: Arc<ProviderCatalog>,
    readiness: Arc<ReadinessGate>,
    collaborators: ArcSwapOption<SessionCollaborators>,
    selection: RwLock<ActiveSelection>,
    /// Timeout applied to the next session's timing buffer
    stt_timeout: RwLock<f64>,
}

impl RuntimeConfigGateway {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        readiness: Arc<ReadinessGate>,
        initial_stt_timeout: f64,
    ) -> Self {
        let selection = ActiveSelection {
            stt: catalog.first(ProviderRole::Stt).map(|e| e.id.clone()),
            llm: catalog.first(ProviderRole::Llm).map(|e| e.id.clone()),
        };
        Self {
            catalog,
            readiness,
            collaborators: ArcSwapOption::empty(),
            selection: RwLock::new(selection),
            stt_timeout: RwLock::new(initial_stt_timeout),
        }
    }

    /// Make `collaborators` the live targets, replacing any earlier session's
    pub fn register(&self, collaborators: SessionCollaborators) {
        let replaced = self.collaborators.swap(Some(Arc::new(collaborators)));
        debug!(replaced = replaced.is_some(), "Session collaborators registered");
    }

    pub fn is_initialized(&self) -> bool {
        self.collaborators.load().is_some()
    }

    fn live(&self) -> Option<Arc<SessionCollaborators>> {
        self.collaborators.load_full()
    }

    pub fn default_prompt_sections(&self) -> DefaultPromptSections {
        DefaultPromptSections::get()
    }

    /// Combine `sections` and apply the result to the live prompt converter
    pub fn set_prompt_sections(&self, sections: &PromptSections) -> Result<(), GatewayError> {
        let live = self
            .live()
            .ok_or(GatewayError::NotInitialized(PROMPT_CONVERTER))?;

        let combined = combine_prompt_sections(sections);
        info!(
            custom = combined.is_some(),
            main = sections.main.enabled,
            advanced = sections.advanced.enabled,
            dictionary = sections.dictionary.enabled,
            "Applying prompt sections"
        );
        live.prompt_converter.set_custom_prompt(combined);
        Ok(())
    }

    pub fn list_available_providers(&self) -> AvailableProviders {
        AvailableProviders {
            stt: self.catalog.available(ProviderRole::Stt),
            llm: self.catalog.available(ProviderRole::Llm),
        }
    }

    pub fn current_providers(&self) -> ActiveSelection {
        self.selection.read().clone()
    }

    /// Service bound to the current selection for `role`
    pub fn active_service(&self, role: ProviderRole) -> Option<Arc<dyn ProviderService>> {
        let selection = self.selection.read();
        selection
            .get(role)
            .and_then(|id| self.catalog.service(role, id))
            .or_else(|| self.catalog.first(role).map(|e| e.service.clone()))
    }

    fn resolve(&self, role: ProviderRole, provider: &str) -> Result<String, GatewayError> {
        if self.catalog.contains(role, provider) {
            return Ok(provider.to_string());
        }
        role.canonical_id(provider)
            .filter(|id| self.catalog.contains(role, id))
            .map(str::to_string)
            .ok_or_else(|| GatewayError::NotAvailable {
                role,
                provider: provider.to_string(),
            })
    }

    /// Switch the active provider for `role`.
    ///
    /// Suspends until the readiness gate is signaled. The selection is only
    /// committed after the live switcher acknowledges the change.
    pub async fn switch_provider(
        &self,
        role: ProviderRole,
        provider: &str,
    ) -> Result<String, GatewayError> {
        if !self.is_initialized() {
            return Err(GatewayError::NotInitialized(switcher_name(role)));
        }

        if !self.readiness.is_ready() {
            debug!(role = %role, provider, "Waiting for pipeline start before switching");
        }
        self.readiness.await_ready().await;

        let id = self.resolve(role, provider)?;
        let service = self
            .catalog
            .service(role, &id)
            .ok_or_else(|| GatewayError::NotAvailable {
                role,
                provider: provider.to_string(),
            })?;

        // Re-read after the wait: a newer session may have registered meanwhile.
        let live = self
            .live()
            .ok_or(GatewayError::NotInitialized(switcher_name(role)))?;

        if let Err(e) = live.switcher(role).switch_to(service).await {
            warn!(role = %role, provider = %id, error = %e, "Provider switch not acknowledged");
            return Err(GatewayError::SwitchFailed {
                role,
                message: e.to_string(),
            });
        }

        self.selection.write().set(role, id.clone());
        info!(role = %role, provider = %id, "Switched provider");
        Ok(id)
    }

    pub fn stt_timeout(&self) -> Result<f64, GatewayError> {
        let live = self.live().ok_or(GatewayError::NotInitialized(TIMING_BUFFER))?;
        Ok(live.timing_buffer.timeout_seconds())
    }

    /// Set the live timing buffer's timeout; out-of-range values change nothing
    pub fn set_stt_timeout(&self, seconds: f64) -> Result<f64, GatewayError> {
        let live = self.live().ok_or(GatewayError::NotInitialized(TIMING_BUFFER))?;
        if !is_valid_stt_timeout(seconds) {
            return Err(GatewayError::OutOfRange(seconds));
        }

        live.timing_buffer.set_timeout_seconds(seconds);
        *self.stt_timeout.write() = seconds;
        Ok(seconds)
    }

    /// Timeout a newly started session's timing buffer begins with
    pub fn session_stt_timeout(&self) -> f64 {
        *self.stt_timeout.read()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeConverter {
        pub prompt: Mutex<Option<String>>,
        pub calls: Mutex<usize>,
    }

    impl PromptConverter for FakeConverter {
        fn custom_prompt(&self) -> Option<String> {
            self.prompt.lock().clone()
        }

        fn set_custom_prompt(&self, prompt: Option<String>) {
            *self.calls.lock() += 1;
            *self.prompt.lock() = prompt;
        }
    }

    pub struct FakeBuffer(pub Mutex<f64>);

    impl TimingBuffer for FakeBuffer {
        fn timeout_seconds(&self) -> f64 {
            *self.0.lock()
        }

        fn set_timeout_seconds(&self, seconds: f64) {
            *self.0.lock() = seconds;
        }
    }

    /// Switcher that acknowledges immediately, or always fails
    pub struct FakeSwitcher {
        pub active: Mutex<String>,
        pub fail: bool,
    }

    impl FakeSwitcher {
        pub fn new(active: &str) -> Self {
            Self {
                active: Mutex::new(active.to_string()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ServiceSwitcher for FakeSwitcher {
        fn active_id(&self) -> String {
            self.active.lock().clone()
        }

        async fn switch_to(&self, service: Arc<dyn ProviderService>) -> Result<(), PipelineError> {
            if self.fail {
                return Err(PipelineError::DirectiveDropped);
            }
            *self.active.lock() = service.id().to_string();
            Ok(())
        }
    }

    pub fn collaborators(
        converter: Arc<FakeConverter>,
        stt: Arc<FakeSwitcher>,
        llm: Arc<FakeSwitcher>,
    ) -> SessionCollaborators {
        SessionCollaborators {
            prompt_converter: converter,
            timing_buffer: Arc::new(FakeBuffer(Mutex::new(0.5))),
            stt_switcher: stt,
            llm_switcher: llm,
        }
    }
}
