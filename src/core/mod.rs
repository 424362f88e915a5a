pub mod catalog;
pub mod prompt;
pub mod provider;
pub mod readiness;
pub mod registry;
pub mod transport;

pub use catalog::{CatalogEntry, CatalogError, ProviderCatalog, ProviderOption};
pub use prompt::{
    DefaultPromptSections, PromptSection, PromptSections, combine_prompt_sections, default_prompt,
};
pub use provider::{
    ConfiguredDirectory, CredentialedService, DirectoryEntry, LlmProvider, ProviderRole,
    ProviderService, ServiceDirectory, SttProvider, UnknownProvider,
};
pub use readiness::ReadinessGate;
pub use registry::ConnectionRegistry;
pub use transport::{
    ConnectionTransport, LoopbackTransport, LoopbackTransportFactory, SessionDescription,
    TransportAnswer, TransportError, TransportFactory,
};
