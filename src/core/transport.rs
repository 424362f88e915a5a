//! Client connection transport boundary
//!
//! The real-time transport (ICE/DTLS negotiation, media tracks) lives outside
//! the gateway. The gateway only needs to create a connection for an offer,
//! renegotiate an existing one, read the audio frames it produces, push
//! messages back to the client, disconnect it, and learn when it closes.
//!
//! [`LoopbackTransport`] is the bundled in-process implementation. It answers
//! offers by mirroring the offered media sections and exposes its input and
//! output channels directly.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipeline::Frame;

/// Capacity of a connection's inbound frame channel
const INPUT_CHANNEL_CAPACITY: usize = 256;

/// Transport layer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Connection not initialized")]
    NotInitialized,

    #[error("Connection closed")]
    Closed,

    #[error("Transport failure: {0}")]
    Failure(String),
}

/// Offered session description as received from the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

/// Answer returned to the client for an offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportAnswer {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub pc_id: String,
}

/// One client connection
#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    /// Connection identity
    fn pc_id(&self) -> String;

    /// Apply the client's initial offer
    async fn initialize(&self, offer: &SessionDescription) -> Result<(), TransportError>;

    /// Apply a follow-up offer on an existing connection
    async fn renegotiate(
        &self,
        offer: &SessionDescription,
        restart_pc: bool,
    ) -> Result<(), TransportError>;

    /// Answer for the most recently applied offer
    fn answer(&self) -> Result<TransportAnswer, TransportError>;

    /// Inbound frame stream. Yields the receiver once; later calls return `None`.
    fn take_input(&self) -> Option<mpsc::Receiver<Frame>>;

    /// Send a message to the client
    async fn send_message(&self, message: serde_json::Value) -> Result<(), TransportError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Resolves once the connection has closed, from either side
    async fn closed(&self);

    fn is_closed(&self) -> bool;
}

/// Creates connections for new offers
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ConnectionTransport>;
}

/// In-process transport
pub struct LoopbackTransport {
    pc_id: String,
    answer: Mutex<Option<TransportAnswer>>,
    input_tx: mpsc::Sender<Frame>,
    input_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    sent: Mutex<Vec<serde_json::Value>>,
    closed: CancellationToken,
    renegotiations: AtomicU32,
    restarts: AtomicU32,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::with_pc_id(format!("pc-{}", uuid::Uuid::new_v4()))
    }

    pub fn with_pc_id(pc_id: impl Into<String>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        Self {
            pc_id: pc_id.into(),
            answer: Mutex::new(None),
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            sent: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            renegotiations: AtomicU32::new(0),
            restarts: AtomicU32::new(0),
        }
    }

    /// Feed a frame into the connection as if it arrived from the client
    pub async fn push_input(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.input_tx
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Messages sent to the client so far
    pub fn sent_messages(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    pub fn renegotiation_count(&self) -> u32 {
        self.renegotiations.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Close from the client side
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            info!(pc_id = %self.pc_id, "Client disconnected");
            self.closed.cancel();
        }
    }

    fn build_answer(&self, offer: &SessionDescription) -> Result<TransportAnswer, TransportError> {
        if offer.sdp_type != "offer" {
            return Err(TransportError::InvalidDescription(format!(
                "expected type 'offer', got '{}'",
                offer.sdp_type
            )));
        }
        if !offer.sdp.trim_start().starts_with("v=") {
            return Err(TransportError::InvalidDescription(
                "sdp must start with a version line".to_string(),
            ));
        }

        let sdp = offer
            .sdp
            .lines()
            .map(|line| match line.trim_end() {
                "a=sendonly" | "a=sendrecv" => "a=recvonly",
                other => other,
            })
            .collect::<Vec<_>>()
            .join("\r\n");

        Ok(TransportAnswer {
            sdp,
            sdp_type: "answer".to_string(),
            pc_id: self.pc_id.clone(),
        })
    }
}

#[async_trait]
impl ConnectionTransport for LoopbackTransport {
    fn pc_id(&self) -> String {
        self.pc_id.clone()
    }

    async fn initialize(&self, offer: &SessionDescription) -> Result<(), TransportError> {
        let answer = self.build_answer(offer)?;
        *self.answer.lock() = Some(answer);
        debug!(pc_id = %self.pc_id, "Connection initialized");
        Ok(())
    }

    async fn renegotiate(
        &self,
        offer: &SessionDescription,
        restart_pc: bool,
    ) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let answer = self.build_answer(offer)?;
        *self.answer.lock() = Some(answer);
        self.renegotiations.fetch_add(1, Ordering::SeqCst);
        if restart_pc {
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
        debug!(pc_id = %self.pc_id, restart_pc, "Connection renegotiated");
        Ok(())
    }

    fn answer(&self) -> Result<TransportAnswer, TransportError> {
        self.answer
            .lock()
            .clone()
            .ok_or(TransportError::NotInitialized)
    }

    fn take_input(&self) -> Option<mpsc::Receiver<Frame>> {
        self.input_rx.lock().take()
    }

    async fn send_message(&self, message: serde_json::Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.closed.is_cancelled() {
            debug!(pc_id = %self.pc_id, "Disconnecting connection");
            self.closed.cancel();
        }
        Ok(())
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Factory producing [`LoopbackTransport`] connections
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackTransportFactory;

impl TransportFactory for LoopbackTransportFactory {
    fn create(&self) -> Arc<dyn ConnectionTransport> {
        Arc::new(LoopbackTransport::new())
    }
}
