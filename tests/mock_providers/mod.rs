//! Mock providers and transports shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tower::util::ServiceExt;

use dictation_gateway::core::{
    ConnectionTransport, DirectoryEntry, LoopbackTransport, ProviderRole, ProviderService,
    ServiceDirectory, TransportFactory,
};
use dictation_gateway::pipeline::{Frame, PipelineError};
use dictation_gateway::{ServerConfig, routes, state::AppState};

/// Provider backend that passes frames through, with knobs for lifecycle tests
pub struct MockService {
    id: String,
    role: ProviderRole,
    start_gate: Option<watch::Receiver<bool>>,
    hang_first_close: bool,
    panic_on: Option<String>,
    closes: AtomicUsize,
}

impl MockService {
    pub fn new(id: &str, role: ProviderRole) -> Self {
        Self {
            id: id.to_string(),
            role,
            start_gate: None,
            hang_first_close: false,
            panic_on: None,
            closes: AtomicUsize::new(0),
        }
    }

    /// Hold every start frame until the gate opens
    pub fn gated(mut self, gate: watch::Receiver<bool>) -> Self {
        self.start_gate = Some(gate);
        self
    }

    /// The first `close` never completes
    pub fn hanging_first_close(mut self) -> Self {
        self.hang_first_close = true;
        self
    }

    /// Panic when a transcription with exactly this text arrives
    pub fn panicking_on(mut self, text: &str) -> Self {
        self.panic_on = Some(text.to_string());
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderService for MockService {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> ProviderRole {
        self.role
    }

    async fn process_frame(&self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        match frame {
            Frame::Start => {
                if let Some(gate) = &self.start_gate {
                    let mut gate = gate.clone();
                    let _ = gate.wait_for(|open| *open).await;
                }
                Ok(vec![Frame::Start])
            }
            Frame::Transcription { text } if self.panic_on.as_deref() == Some(text.as_str()) => {
                panic!("mock provider fault on {text:?}")
            }
            // Echo the prompt so tests can see what the language model received
            Frame::LlmRequest {
                system_prompt,
                text,
            } if self.role == ProviderRole::Llm => Ok(vec![Frame::LlmText {
                text: format!("{system_prompt}\n---\n{text}"),
            }]),
            other => Ok(vec![other]),
        }
    }

    async fn close(&self) -> Result<(), PipelineError> {
        let n = self.closes.fetch_add(1, Ordering::SeqCst);
        if self.hang_first_close && n == 0 {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

type Entry = (String, String, Arc<dyn ProviderService>);

/// Service directory with explicit entries, in catalog order
#[derive(Default)]
pub struct MockDirectory {
    stt: Vec<Entry>,
    llm: Vec<Entry>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, service: Arc<dyn ProviderService>) -> Self {
        let entry = (service.id().to_string(), label.to_string(), service.clone());
        match service.role() {
            ProviderRole::Stt => self.stt.push(entry),
            ProviderRole::Llm => self.llm.push(entry),
        }
        self
    }

    pub fn with_service(self, id: &str, role: ProviderRole) -> Self {
        let label = id.to_uppercase();
        self.with(&label, Arc::new(MockService::new(id, role)))
    }
}

impl ServiceDirectory for MockDirectory {
    fn entries(&self, role: ProviderRole) -> Vec<DirectoryEntry> {
        let entries = match role {
            ProviderRole::Stt => &self.stt,
            ProviderRole::Llm => &self.llm,
        };
        entries
            .iter()
            .map(|(id, label, service)| DirectoryEntry {
                id: id.clone(),
                label: label.clone(),
                service: Ok(service.clone()),
            })
            .collect()
    }
}

/// Loopback transports that stay reachable from the test
#[derive(Default)]
pub struct RecordingFactory {
    created: Mutex<Vec<Arc<LoopbackTransport>>>,
}

impl RecordingFactory {
    pub fn created(&self) -> Vec<Arc<LoopbackTransport>> {
        self.created.lock().clone()
    }

    pub fn connection(&self, pc_id: &str) -> Option<Arc<LoopbackTransport>> {
        self.created
            .lock()
            .iter()
            .find(|t| t.pc_id() == pc_id)
            .cloned()
    }
}

impl TransportFactory for RecordingFactory {
    fn create(&self) -> Arc<dyn ConnectionTransport> {
        let transport = Arc::new(LoopbackTransport::new());
        self.created.lock().push(transport.clone());
        transport
    }
}

/// Minimal configuration; providers come from the directory
pub fn create_test_config() -> ServerConfig {
    ServerConfig {
        rate_limit_requests_per_second: 100000, // Disable for tests
        ..ServerConfig::default()
    }
}

pub fn create_state(directory: &MockDirectory, transports: Arc<RecordingFactory>) -> Arc<AppState> {
    match AppState::with_collaborators(create_test_config(), directory, transports) {
        Ok(state) => state,
        Err(e) => panic!("mock directory must cover both roles: {e}"),
    }
}

pub fn create_app(state: &Arc<AppState>) -> Router {
    routes::api::create_api_router().with_state(state.clone())
}

pub async fn get_json(app: &Router, uri: &str) -> (u16, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (u16, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (u16, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub fn offer_body(pc_id: Option<&str>) -> Value {
    serde_json::json!({
        "sdp": "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\na=sendrecv\r\n",
        "type": "offer",
        "pc_id": pc_id,
        "restart_pc": false,
    })
}
