//! Session lifecycle state machine
//!
//! ```text
//!     +-----------+
//!     |  Created  |  (collaborators built and registered)
//!     +-----+-----+
//!           |
//!           v
//!     +-----+-----+
//!     |  Starting |  (task scheduled, pipeline initializing)
//!     +-----+-----+
//!           |
//!           v
//!     +-----+-----+
//!     |  Running  |  (start frame passed every stage, readiness signaled)
//!     +-----+-----+
//!           |
//!           v
//!     +-----+-------+
//!     | Terminating |  (cancellation requested or pipeline ended)
//!     +-----+-------+
//!           |
//!           v
//!     +-----+------+
//!     | Terminated |  (task finished, removed from tracking)
//!     +------------+
//! ```
//!
//! Transitions only move forward. `Running` may be skipped when a session is
//! cancelled before its pipeline starts. `Terminated` is absorbing.

use tokio::sync::watch;
use tracing::debug;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Created,
    Starting,
    Running,
    Terminating,
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Terminating => write!(f, "terminating"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

impl SessionState {
    /// Check if `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        next > *self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }

    /// Check if the session still owns a live pipeline
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }
}

/// Observable state of one session
#[derive(Debug)]
pub struct SessionStatus {
    pc_id: String,
    tx: watch::Sender<SessionState>,
}

impl SessionStatus {
    pub fn new(pc_id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::Created);
        Self {
            pc_id: pc_id.into(),
            tx,
        }
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Move to `next` if that is a forward transition. Returns whether it moved.
    pub fn advance(&self, next: SessionState) -> bool {
        let moved = self.tx.send_if_modified(|state| {
            if state.can_advance_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(pc_id = %self.pc_id, state = %next, "Session state changed");
        }
        moved
    }

    /// Wait until the session has reached `state` or moved past it
    pub async fn reached(&self, state: SessionState) -> SessionState {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(|current| *current >= state).await {
            Ok(current) => *current,
            Err(_) => self.get(),
        }
    }
}
