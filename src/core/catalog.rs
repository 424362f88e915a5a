//! Provider catalog
//!
//! The catalog is built once at startup from a [`ServiceDirectory`] and is
//! immutable afterwards. Providers without usable credentials never enter it.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::provider::{ProviderRole, ProviderService, ServiceDirectory};

/// Catalog construction errors. Both are fatal at process start.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(
        "No {} providers available. Configure at least one {} API key.",
        .role.display_name(),
        .role.display_name()
    )]
    Empty { role: ProviderRole },
}

/// A provider as presented to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOption {
    /// Provider id (e.g. "deepgram")
    pub value: String,
    /// Display label (e.g. "Deepgram")
    pub label: String,
}

/// One catalog entry: id, label and the bound service handle
#[derive(Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
    pub service: Arc<dyn ProviderService>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// Available backend services per role, in directory order
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    stt: Vec<CatalogEntry>,
    llm: Vec<CatalogEntry>,
}

impl ProviderCatalog {
    /// Build the catalog, keeping only entries whose service could be bound.
    ///
    /// # Errors
    /// Returns [`CatalogError::Empty`] if either role ends up without providers.
    pub fn from_directory(directory: &dyn ServiceDirectory) -> Result<Self, CatalogError> {
        let stt = Self::collect(directory, ProviderRole::Stt)?;
        let llm = Self::collect(directory, ProviderRole::Llm)?;

        info!(
            stt = ?stt.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            llm = ?llm.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "Provider catalog initialized"
        );

        Ok(Self { stt, llm })
    }

    fn collect(
        directory: &dyn ServiceDirectory,
        role: ProviderRole,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut entries: Vec<CatalogEntry> = Vec::new();

        for entry in directory.entries(role) {
            match entry.service {
                Ok(service) => {
                    if entries.iter().any(|e| e.id == entry.id) {
                        debug!(role = %role, provider = %entry.id, "Skipping duplicate provider");
                        continue;
                    }
                    entries.push(CatalogEntry {
                        id: entry.id,
                        label: entry.label,
                        service,
                    });
                }
                Err(reason) => {
                    debug!(role = %role, provider = %entry.id, %reason, "Provider unavailable");
                }
            }
        }

        if entries.is_empty() {
            return Err(CatalogError::Empty { role });
        }
        Ok(entries)
    }

    fn entries(&self, role: ProviderRole) -> &[CatalogEntry] {
        match role {
            ProviderRole::Stt => &self.stt,
            ProviderRole::Llm => &self.llm,
        }
    }

    /// Providers available for a role, in insertion order
    pub fn available(&self, role: ProviderRole) -> Vec<ProviderOption> {
        self.entries(role)
            .iter()
            .map(|e| ProviderOption {
                value: e.id.clone(),
                label: e.label.clone(),
            })
            .collect()
    }

    /// Whether `id` is an available provider for `role`
    pub fn contains(&self, role: ProviderRole, id: &str) -> bool {
        self.entries(role).iter().any(|e| e.id == id)
    }

    /// Service handle bound to `id` for `role`
    pub fn service(&self, role: ProviderRole, id: &str) -> Option<Arc<dyn ProviderService>> {
        self.entries(role)
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.service.clone())
    }

    /// First provider registered for `role`
    pub fn first(&self, role: ProviderRole) -> Option<&CatalogEntry> {
        self.entries(role).first()
    }
}
