//! Session management
//!
//! One session per client connection. A session owns a pipeline bound to the
//! connection, runs it as a supervised task, and registers its live
//! collaborators with the runtime configuration gateway.

pub mod state;
pub mod supervisor;

pub use state::{SessionState, SessionStatus};
pub use supervisor::{SupervisedTask, TaskSupervisor};

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::provider::ProviderRole;
use crate::core::readiness::ReadinessGate;
use crate::core::registry::ConnectionRegistry;
use crate::core::transport::{
    ConnectionTransport, SessionDescription, TransportAnswer, TransportError, TransportFactory,
};
use crate::gateway::{RuntimeConfigGateway, SessionCollaborators};
use crate::pipeline::{
    DebugFrameObserver, FrameProcessor, LlmResponseConverter, Pipeline,
    ServiceSwitcherStage, SwitcherHandle, TextResponse, TranscriptionBuffer, TranscriptionToLlm,
    TransportOutput,
};

/// Session setup errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No {} provider available for a new session", .0.display_name())]
    NoProvider(ProviderRole),
}

/// Handle to a started session
#[derive(Debug)]
pub struct SessionHandle {
    pc_id: String,
    status: Arc<SessionStatus>,
    task: SupervisedTask,
}

impl SessionHandle {
    pub fn pc_id(&self) -> &str {
        &self.pc_id
    }

    pub fn state(&self) -> SessionState {
        self.status.get()
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Wait for the session task to finish
    pub async fn join(self) {
        if let Err(e) = self.task.join().await {
            warn!(pc_id = %self.pc_id, error = %e, "Session task did not finish cleanly");
        }
    }
}

type StatusTable = Arc<DashMap<String, Arc<SessionStatus>>>;

/// Marks the session terminated and forgets its status on every exit path
struct SessionExit {
    statuses: StatusTable,
    pc_id: String,
    status: Arc<SessionStatus>,
}

impl Drop for SessionExit {
    fn drop(&mut self) {
        self.status.advance(SessionState::Terminated);
        let status = &self.status;
        self.statuses
            .remove_if(&self.pc_id, |_, current| Arc::ptr_eq(current, status));
    }
}

/// Spawns, supervises and tears down sessions
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    readiness: Arc<ReadinessGate>,
    gateway: Arc<RuntimeConfigGateway>,
    supervisor: TaskSupervisor,
    statuses: StatusTable,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        readiness: Arc<ReadinessGate>,
        gateway: Arc<RuntimeConfigGateway>,
    ) -> Self {
        Self {
            registry,
            readiness,
            gateway,
            supervisor: TaskSupervisor::new(),
            statuses: Arc::new(DashMap::new()),
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Number of tracked session tasks
    pub fn session_count(&self) -> usize {
        self.supervisor.len()
    }

    pub fn session_state(&self, pc_id: &str) -> Option<SessionState> {
        self.statuses.get(pc_id).map(|status| status.get())
    }

    pub fn session_status(&self, pc_id: &str) -> Option<Arc<SessionStatus>> {
        self.statuses.get(pc_id).map(|status| status.clone())
    }

    /// Handle an offer: renegotiate a known connection or create a new one.
    ///
    /// Only a new connection starts a session.
    pub async fn negotiate(
        &self,
        factory: &dyn TransportFactory,
        offer: &SessionDescription,
        pc_id: Option<&str>,
        restart_pc: bool,
    ) -> Result<TransportAnswer, SessionError> {
        if let Some(pc_id) = pc_id
            && let Some(connection) = self.registry.get(pc_id)
            && !connection.is_closed()
        {
            info!(pc_id = %pc_id, restart_pc, "Reusing existing connection");
            connection.renegotiate(offer, restart_pc).await?;
            let answer = connection.answer()?;
            self.registry.put(answer.pc_id.clone(), connection);
            return Ok(answer);
        }

        if let Some(pc_id) = pc_id {
            info!(pc_id = %pc_id, "Unknown pc_id, creating a new connection");
        }

        let connection = factory.create();
        connection.initialize(offer).await?;
        let answer = connection.answer()?;

        self.registry.put(answer.pc_id.clone(), connection.clone());
        if let Err(e) = self.start_session(connection) {
            self.registry.remove(&answer.pc_id);
            return Err(e);
        }
        Ok(answer)
    }

    /// Build a pipeline for `connection` and run it as a supervised task
    pub fn start_session(
        &self,
        connection: Arc<dyn ConnectionTransport>,
    ) -> Result<SessionHandle, SessionError> {
        let pc_id = connection.pc_id();
        let status = Arc::new(SessionStatus::new(pc_id.clone()));

        let stt_service = self
            .gateway
            .active_service(ProviderRole::Stt)
            .ok_or(SessionError::NoProvider(ProviderRole::Stt))?;
        let llm_service = self
            .gateway
            .active_service(ProviderRole::Llm)
            .ok_or(SessionError::NoProvider(ProviderRole::Llm))?;

        let stt_switcher = Arc::new(ServiceSwitcherStage::new(ProviderRole::Stt, stt_service));
        let llm_switcher = Arc::new(ServiceSwitcherStage::new(ProviderRole::Llm, llm_service));
        let buffer = Arc::new(TranscriptionBuffer::new(self.gateway.session_stt_timeout()));
        let converter = Arc::new(TranscriptionToLlm::new());

        let stages: Vec<Arc<dyn FrameProcessor>> = vec![
            stt_switcher.clone(),
            buffer.clone(),
            converter.clone(),
            llm_switcher.clone(),
            Arc::new(LlmResponseConverter),
            Arc::new(TextResponse),
            Arc::new(TransportOutput::new(connection.clone())),
        ];

        let started_status = status.clone();
        let started_readiness = self.readiness.clone();
        let pipeline = Arc::new(
            Pipeline::new(stages)
                .with_observer(0, Arc::new(DebugFrameObserver::new("input")))
                .with_observer(1, Arc::new(DebugFrameObserver::new("after-stt")))
                .with_on_started(move || {
                    started_status.advance(SessionState::Running);
                    started_readiness.signal();
                }),
        );

        self.gateway.register(SessionCollaborators {
            prompt_converter: converter,
            timing_buffer: buffer,
            stt_switcher: Arc::new(SwitcherHandle::new(
                ProviderRole::Stt,
                pipeline.queue(),
                stt_switcher,
            )),
            llm_switcher: Arc::new(SwitcherHandle::new(
                ProviderRole::Llm,
                pipeline.queue(),
                llm_switcher,
            )),
        });

        if let Some(previous) = self.statuses.insert(pc_id.clone(), status.clone()) {
            warn!(pc_id = %pc_id, state = %previous.get(), "Replacing existing session");
        }

        let exit = SessionExit {
            statuses: self.statuses.clone(),
            pc_id: pc_id.clone(),
            status: status.clone(),
        };
        let input = connection.take_input();
        let session_connection = connection.clone();

        info!(pc_id = %pc_id, "Starting pipeline for new connection");
        status.advance(SessionState::Starting);

        let task = self.supervisor.spawn(pc_id.clone(), move |cancel| async move {
            let exit = exit;
            let pc_id = exit.pc_id.clone();

            let outcome = tokio::select! {
                result = pipeline.run_with_input(input) => match result {
                    Ok(()) => "completed",
                    Err(e) => {
                        error!(pc_id = %pc_id, error = %e, "Pipeline failed");
                        "failed"
                    }
                },
                _ = cancel.cancelled() => if session_connection.is_closed() {
                    "disconnected"
                } else {
                    "cancelled"
                },
            };

            exit.status.advance(SessionState::Terminating);
            pipeline.cleanup().await;
            info!(pc_id = %pc_id, outcome, "Session ended");
        });
        self.watch_disconnect(connection, task.cancellation_token());

        Ok(SessionHandle {
            pc_id,
            status,
            task,
        })
    }

    /// Tear down after the client closes, whether or not the session still runs.
    ///
    /// Lives outside the session task so a pipeline that already ended (or
    /// faulted) still releases its registry entry.
    fn watch_disconnect(&self, connection: Arc<dyn ConnectionTransport>, cancel: CancellationToken) {
        let registry = self.registry.clone();
        let readiness = self.readiness.clone();
        tokio::spawn(async move {
            connection.closed().await;
            let pc_id = connection.pc_id();
            info!(pc_id = %pc_id, "Client disconnected, cancelling session");
            readiness.reset();
            registry.remove_if_same(&pc_id, &connection);
            cancel.cancel();
        });
    }
}
