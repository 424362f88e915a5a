//! Readiness gate
//!
//! Single-slot broadcast signal meaning "the pipeline has started consuming
//! frames and is safe to reconfigure".
//!
//! Reset semantics: [`ReadinessGate::reset`] clears the flag for future
//! waiters only. A waiter that was pending when [`ReadinessGate::signal`] was
//! called is released by that signal even if a reset follows before the
//! waiter gets polled again.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
struct ReadinessState {
    ready: bool,
    /// Number of not-ready to ready transitions so far
    signals: u64,
}

/// Process-wide "pipeline started" flag with waiters
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<ReadinessState>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadinessState::default());
        Self { tx }
    }

    /// Set the flag and release every current waiter. Idempotent.
    pub fn signal(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if state.ready {
                return false;
            }
            state.ready = true;
            state.signals += 1;
            true
        });
        if changed {
            info!("Pipeline started event set");
        }
    }

    /// Clear the flag. Waiters already released stay released.
    pub fn reset(&self) {
        let changed = self.tx.send_if_modified(|state| {
            let was_ready = state.ready;
            state.ready = false;
            was_ready
        });
        if changed {
            info!("Pipeline started event cleared");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().ready
    }

    /// Number of callers currently suspended in [`ReadinessGate::await_ready`]
    pub fn waiter_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Suspend until the gate is signaled. Returns immediately if it already is.
    ///
    /// There is no timeout: if no pipeline ever starts, this never resolves.
    pub async fn await_ready(&self) {
        let mut rx = self.tx.subscribe();
        let seen = {
            let state = *rx.borrow_and_update();
            if state.ready {
                return;
            }
            state.signals
        };

        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| s.ready || s.signals > seen).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_for_waiters(gate: &ReadinessGate, n: usize) {
        while gate.waiter_count() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_await_ready_returns_immediately_when_signaled() {
        let gate = ReadinessGate::new();
        gate.signal();
        assert!(gate.is_ready());

        timeout(Duration::from_millis(50), gate.await_ready())
            .await
            .expect("signaled gate must not suspend");
    }

    #[tokio::test]
    async fn test_waiters_pend_until_signal() {
        let gate = Arc::new(ReadinessGate::new());

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            waiters.push(tokio::spawn(async move { gate.await_ready().await }));
        }
        wait_for_waiters(&gate, 3).await;

        for w in &waiters {
            assert!(!w.is_finished());
        }

        gate.signal();
        for w in waiters {
            timeout(Duration::from_secs(1), w)
                .await
                .expect("waiter released")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_signal_is_idempotent() {
        let gate = ReadinessGate::new();
        gate.signal();
        gate.signal();
        assert!(gate.is_ready());
        gate.reset();
        assert!(!gate.is_ready());
    }

    #[tokio::test]
    async fn test_reset_blocks_future_waiters() {
        let gate = ReadinessGate::new();
        gate.signal();
        gate.reset();

        let result = timeout(Duration::from_millis(50), gate.await_ready()).await;
        assert!(result.is_err(), "waiter after reset must suspend");
    }

    #[tokio::test]
    async fn test_reset_does_not_unrelease_pending_waiter() {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_ready().await })
        };
        wait_for_waiters(&gate, 1).await;

        // Signal and reset back to back, before the waiter is polled again
        gate.signal();
        gate.reset();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter pending at signal time must be released")
            .unwrap();
    }
}
