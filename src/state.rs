//! Application state
//!
//! `AppState` is the composition root: it owns every process-wide component
//! and is handed to the HTTP layer by reference. Independent instances do not
//! share anything, which keeps tests isolated from each other.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::catalog::{CatalogError, ProviderCatalog};
use crate::core::provider::{ConfiguredDirectory, ServiceDirectory};
use crate::core::readiness::ReadinessGate;
use crate::core::registry::ConnectionRegistry;
use crate::core::transport::{LoopbackTransportFactory, TransportFactory};
use crate::gateway::RuntimeConfigGateway;
use crate::session::SessionManager;
use crate::shutdown::ShutdownCoordinator;

pub struct AppState {
    pub config: ServerConfig,
    pub catalog: Arc<ProviderCatalog>,
    pub registry: Arc<ConnectionRegistry>,
    pub readiness: Arc<ReadinessGate>,
    pub gateway: Arc<RuntimeConfigGateway>,
    pub sessions: Arc<SessionManager>,
    pub transports: Arc<dyn TransportFactory>,
}

impl AppState {
    /// Build the state from configuration, binding the built-in providers.
    ///
    /// # Errors
    /// Fails when either provider role has no credentialed provider.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, CatalogError> {
        let directory = ConfiguredDirectory::new(config.clone());
        Self::with_collaborators(config, &directory, Arc::new(LoopbackTransportFactory))
    }

    /// Build the state from an explicit service directory and transport factory
    pub fn with_collaborators(
        config: ServerConfig,
        directory: &dyn ServiceDirectory,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Arc<Self>, CatalogError> {
        let catalog = Arc::new(ProviderCatalog::from_directory(directory)?);
        let registry = Arc::new(ConnectionRegistry::new());
        let readiness = Arc::new(ReadinessGate::new());
        let gateway = Arc::new(RuntimeConfigGateway::new(
            catalog.clone(),
            readiness.clone(),
            config.stt_timeout_seconds,
        ));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            readiness.clone(),
            gateway.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            catalog,
            registry,
            readiness,
            gateway,
            sessions,
            transports,
        }))
    }

    /// Shutdown coordinator using the configured phase timeout
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        ShutdownCoordinator::new(
            self.sessions.clone(),
            self.registry.clone(),
            Duration::from_secs_f64(self.config.shutdown_timeout_seconds),
        )
    }
}
