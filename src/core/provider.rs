//! Provider roles, provider ids and service handles
//!
//! A provider is a backend service that fills one role in the dictation
//! pipeline: speech-to-text or language-model cleanup. The gateway never talks
//! to a backend directly; it only holds [`ProviderService`] handles and hands
//! them to a session's service switcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::config::ServerConfig;
use crate::pipeline::{Frame, PipelineError};

/// Role a provider plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    /// Speech-to-text
    Stt,
    /// Language-model text cleanup
    Llm,
}

impl ProviderRole {
    pub const ALL: [ProviderRole; 2] = [ProviderRole::Stt, ProviderRole::Llm];

    /// Upper-case name used in user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderRole::Stt => "STT",
            ProviderRole::Llm => "LLM",
        }
    }

    /// Resolve a user-supplied token to the canonical provider id for this role
    pub fn canonical_id(&self, raw: &str) -> Option<&'static str> {
        match self {
            ProviderRole::Stt => raw.parse::<SttProvider>().ok().map(|p| p.as_str()),
            ProviderRole::Llm => raw.parse::<LlmProvider>().ok().map(|p| p.as_str()),
        }
    }
}

impl std::fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderRole::Stt => write!(f, "stt"),
            ProviderRole::Llm => write!(f, "llm"),
        }
    }
}

/// Error returned when a provider token does not name a known provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported {role} provider: {token}")]
pub struct UnknownProvider {
    pub role: ProviderRole,
    pub token: String,
}

/// Supported speech-to-text providers, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SttProvider {
    Deepgram,
    Cartesia,
    AssemblyAI,
    ElevenLabs,
    OpenAI,
    Groq,
}

impl SttProvider {
    pub const ALL: [SttProvider; 6] = [
        SttProvider::Deepgram,
        SttProvider::Cartesia,
        SttProvider::AssemblyAI,
        SttProvider::ElevenLabs,
        SttProvider::OpenAI,
        SttProvider::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SttProvider::Deepgram => "deepgram",
            SttProvider::Cartesia => "cartesia",
            SttProvider::AssemblyAI => "assemblyai",
            SttProvider::ElevenLabs => "elevenlabs",
            SttProvider::OpenAI => "openai",
            SttProvider::Groq => "groq",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SttProvider::Deepgram => "Deepgram",
            SttProvider::Cartesia => "Cartesia",
            SttProvider::AssemblyAI => "AssemblyAI",
            SttProvider::ElevenLabs => "ElevenLabs",
            SttProvider::OpenAI => "OpenAI Whisper",
            SttProvider::Groq => "Groq Whisper",
        }
    }
}

impl std::fmt::Display for SttProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SttProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepgram" => Ok(SttProvider::Deepgram),
            "cartesia" => Ok(SttProvider::Cartesia),
            "assemblyai" | "assembly-ai" => Ok(SttProvider::AssemblyAI),
            "elevenlabs" | "eleven-labs" => Ok(SttProvider::ElevenLabs),
            "openai" => Ok(SttProvider::OpenAI),
            "groq" => Ok(SttProvider::Groq),
            _ => Err(UnknownProvider {
                role: ProviderRole::Stt,
                token: s.to_string(),
            }),
        }
    }
}

/// Supported language-model providers, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    Cerebras,
    OpenRouter,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 6] = [
        LlmProvider::OpenAI,
        LlmProvider::Anthropic,
        LlmProvider::Gemini,
        LlmProvider::Groq,
        LlmProvider::Cerebras,
        LlmProvider::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Groq => "groq",
            LlmProvider::Cerebras => "cerebras",
            LlmProvider::OpenRouter => "openrouter",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Anthropic => "Anthropic Claude",
            LlmProvider::Gemini => "Google Gemini",
            LlmProvider::Groq => "Groq",
            LlmProvider::Cerebras => "Cerebras",
            LlmProvider::OpenRouter => "OpenRouter",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAI),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "groq" => Ok(LlmProvider::Groq),
            "cerebras" => Ok(LlmProvider::Cerebras),
            "openrouter" => Ok(LlmProvider::OpenRouter),
            _ => Err(UnknownProvider {
                role: ProviderRole::Llm,
                token: s.to_string(),
            }),
        }
    }
}

/// Handle to a backend service bound into a session's service switcher.
///
/// Frames reach the handle only while it is the switcher's active service.
#[async_trait]
pub trait ProviderService: Send + Sync {
    /// Canonical provider id (e.g. "deepgram")
    fn id(&self) -> &str;

    /// Role this service fills
    fn role(&self) -> ProviderRole;

    /// Process one frame, returning the frames to pass downstream
    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError>;

    /// Release per-session backend resources when a session is torn down
    async fn close(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Service handle backed by a configured credential.
///
/// The wire protocol of each backend lives outside the gateway; frames pass
/// through unchanged so the rest of the pipeline stays observable.
pub struct CredentialedService {
    id: &'static str,
    role: ProviderRole,
    api_key: Zeroizing<String>,
}

impl CredentialedService {
    pub fn new(role: ProviderRole, id: &'static str, api_key: String) -> Self {
        Self {
            id,
            role,
            api_key: Zeroizing::new(api_key),
        }
    }

    /// True when the credential is usable
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for CredentialedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialedService")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ProviderService for CredentialedService {
    fn id(&self) -> &str {
        self.id
    }

    fn role(&self) -> ProviderRole {
        self.role
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        Ok(vec![frame])
    }
}

/// One backend implementation offered by a [`ServiceDirectory`]
pub struct DirectoryEntry {
    pub id: String,
    pub label: String,
    /// The bound service, or the reason it could not be bound
    pub service: Result<Arc<dyn ProviderService>, String>,
}

/// Enumerates backend implementations per role
pub trait ServiceDirectory: Send + Sync {
    fn entries(&self, role: ProviderRole) -> Vec<DirectoryEntry>;
}

/// Directory of the built-in providers, bound from server configuration
pub struct ConfiguredDirectory {
    config: ServerConfig,
}

impl ConfiguredDirectory {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn bind(&self, role: ProviderRole, id: &'static str, label: &str) -> DirectoryEntry {
        let service = self.config.get_api_key(id).map(|key| {
            Arc::new(CredentialedService::new(role, id, key)) as Arc<dyn ProviderService>
        });
        DirectoryEntry {
            id: id.to_string(),
            label: label.to_string(),
            service,
        }
    }
}

impl ServiceDirectory for ConfiguredDirectory {
    fn entries(&self, role: ProviderRole) -> Vec<DirectoryEntry> {
        match role {
            ProviderRole::Stt => SttProvider::ALL
                .iter()
                .map(|p| self.bind(role, p.as_str(), p.label()))
                .collect(),
            ProviderRole::Llm => LlmProvider::ALL
                .iter()
                .map(|p| self.bind(role, p.as_str(), p.label()))
                .collect(),
        }
    }
}
