//! Bounded-time process shutdown
//!
//! Order is fixed: sessions are cancelled and awaited first, since a session
//! may still need its connection to flush a final frame. Connections are
//! disconnected afterwards. Each phase has its own timeout and shutdown moves
//! on when it expires.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::core::registry::ConnectionRegistry;
use crate::session::SessionManager;

/// Outcome of a shutdown run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions still running when the session phase timed out
    pub sessions_timed_out: bool,
    /// Disconnects still pending when the connection phase timed out
    pub connections_timed_out: bool,
}

/// Orchestrates process teardown
pub struct ShutdownCoordinator {
    sessions: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
    session_timeout: Duration,
    connection_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<ConnectionRegistry>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            registry,
            session_timeout: phase_timeout,
            connection_timeout: phase_timeout,
        }
    }

    pub fn with_timeouts(mut self, sessions: Duration, connections: Duration) -> Self {
        self.session_timeout = sessions;
        self.connection_timeout = connections;
        self
    }

    /// Cancel every session, disconnect every connection, then clear both sets.
    ///
    /// Completes within roughly the sum of the two phase timeouts.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        info!("Shutting down...");

        let supervisor = self.sessions.supervisor();
        let running = supervisor.len();
        supervisor.cancel_all();
        if running > 0 {
            match timeout(self.session_timeout, supervisor.wait_all()).await {
                Ok(()) => info!(sessions = running, "All pipeline tasks cancelled"),
                Err(_) => {
                    report.sessions_timed_out = true;
                    warn!(
                        remaining = supervisor.len(),
                        timeout_secs = self.session_timeout.as_secs_f64(),
                        "Timeout waiting for pipeline tasks, forcing shutdown"
                    );
                }
            }
        }

        let connections = self.registry.all();
        if !connections.is_empty() {
            let count = connections.len();
            let disconnects = join_all(connections.iter().map(|connection| async move {
                if let Err(e) = connection.disconnect().await {
                    warn!(pc_id = %connection.pc_id(), error = %e, "Disconnect failed");
                }
            }));
            match timeout(self.connection_timeout, disconnects).await {
                Ok(_) => info!(connections = count, "All peer connections closed"),
                Err(_) => {
                    report.connections_timed_out = true;
                    warn!(
                        timeout_secs = self.connection_timeout.as_secs_f64(),
                        "Timeout closing peer connections, forcing shutdown"
                    );
                }
            }
        }

        supervisor.clear();
        self.registry.clear();
        info!("Shutdown complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ProviderCatalog;
    use crate::core::catalog::test_support::StaticDirectory;
    use crate::core::readiness::ReadinessGate;
    use crate::core::transport::{LoopbackTransportFactory, SessionDescription};
    use crate::gateway::RuntimeConfigGateway;
    use crate::session::SessionState;

    fn setup() -> (Arc<SessionManager>, Arc<ConnectionRegistry>) {
        let directory = StaticDirectory {
            stt: vec![("deepgram", "Deepgram", true)],
            llm: vec![("openai", "OpenAI", true)],
        };
        let catalog = Arc::new(ProviderCatalog::from_directory(&directory).unwrap());
        let readiness = Arc::new(ReadinessGate::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let gateway = Arc::new(RuntimeConfigGateway::new(catalog, readiness.clone(), 0.5));
        let sessions = Arc::new(SessionManager::new(registry.clone(), readiness, gateway));
        (sessions, registry)
    }

    #[tokio::test]
    async fn test_shutdown_with_nothing_running() {
        let (sessions, registry) = setup();
        let coordinator = ShutdownCoordinator::new(sessions, registry, Duration::from_secs(2));
        assert_eq!(coordinator.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_sessions_then_disconnects() {
        let (sessions, registry) = setup();
        let offer = SessionDescription {
            sdp: "v=0".to_string(),
            sdp_type: "offer".to_string(),
        };
        let mut statuses = Vec::new();
        for _ in 0..3 {
            let answer = sessions
                .negotiate(&LoopbackTransportFactory, &offer, None, false)
                .await
                .unwrap();
            statuses.push(sessions.session_status(&answer.pc_id).unwrap());
        }
        let connections = registry.all();

        let coordinator =
            ShutdownCoordinator::new(sessions.clone(), registry.clone(), Duration::from_secs(2));
        let report = coordinator.shutdown().await;

        assert_eq!(report, ShutdownReport::default());
        for status in statuses {
            assert_eq!(status.get(), SessionState::Terminated);
        }
        assert!(connections.iter().all(|c| c.is_closed()));
        assert!(registry.is_empty());
        assert_eq!(sessions.session_count(), 0);
    }
}
