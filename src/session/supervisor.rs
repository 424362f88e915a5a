//! Supervised background tasks
//!
//! Every session runs as one task spawned through [`TaskSupervisor`]. The
//! supervisor records the task under its id together with a cancellation
//! token, and the task removes its own record when it finishes. Removal is
//! done by a guard owned by the task's future, so it runs on every exit path:
//! normal completion, cancellation, panic, or abort.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug)]
struct TaskEntry {
    cancel: CancellationToken,
    seq: u64,
}

type TaskTable = Arc<DashMap<String, TaskEntry>>;

/// Removes a task's record when dropped, unless a newer task took its id
struct Deregister {
    tasks: TaskTable,
    id: String,
    seq: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        let seq = self.seq;
        if self.tasks.remove_if(&self.id, |_, entry| entry.seq == seq).is_some() {
            debug!(task = %self.id, "Supervised task deregistered");
        }
    }
}

/// Handle to a supervised task
#[derive(Debug)]
pub struct SupervisedTask {
    id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SupervisedTask {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task at its next suspension point without cooperation
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the task to finish. A panic inside the task surfaces here.
    pub async fn join(self) -> Result<(), JoinError> {
        self.handle.await
    }
}

/// Tracked set of running tasks
#[derive(Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    tasks: TaskTable,
    next_seq: AtomicU64,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under `id`.
    ///
    /// `task` receives the cancellation token it must observe. A task already
    /// running under the same id is asked to cancel and loses its record.
    pub fn spawn<F, Fut>(&self, id: impl Into<String>, task: F) -> SupervisedTask
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let cancel = CancellationToken::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.tasks.insert(
            id.clone(),
            TaskEntry {
                cancel: cancel.clone(),
                seq,
            },
        ) {
            warn!(task = %id, "Replacing supervised task with the same id");
            previous.cancel.cancel();
        }

        let guard = Deregister {
            tasks: self.tasks.clone(),
            id: id.clone(),
            seq,
        };
        let future = task(cancel.clone());
        let handle = self.tracker.spawn(async move {
            let _guard = guard;
            future.await;
        });

        SupervisedTask { id, cancel, handle }
    }

    /// Request cancellation of every tracked task
    pub fn cancel_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().cancel.cancel();
        }
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.tasks.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait until every spawned task has finished, including tasks spawned
    /// while waiting
    pub async fn wait_all(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Forget every record. Running tasks keep running.
    pub fn clear(&self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_completed_task_is_removed() {
        let supervisor = TaskSupervisor::new();
        let task = supervisor.spawn("a", |_| async {});
        task.join().await.unwrap();
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_task_is_removed() {
        let supervisor = TaskSupervisor::new();
        let task = supervisor.spawn("a", |cancel| async move { cancel.cancelled().await });
        assert!(supervisor.contains("a"));

        assert!(supervisor.cancel("a"));
        task.join().await.unwrap();
        assert!(!supervisor.contains("a"));
    }

    #[tokio::test]
    async fn test_panicking_task_is_removed_and_isolated() {
        let supervisor = TaskSupervisor::new();
        let survivor = supervisor.spawn("ok", |cancel| async move { cancel.cancelled().await });
        let task = supervisor.spawn("boom", |_| async { panic!("session fault"); });

        assert!(task.join().await.unwrap_err().is_panic());
        assert!(!supervisor.contains("boom"));
        assert!(supervisor.contains("ok"));

        survivor.cancel();
        survivor.join().await.unwrap();
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_task_is_removed() {
        let supervisor = TaskSupervisor::new();
        let task = supervisor.spawn("a", |_| std::future::pending::<()>());
        task.abort();
        assert!(task.join().await.unwrap_err().is_cancelled());
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_replaced_task_keeps_newer_record() {
        let supervisor = TaskSupervisor::new();
        let old = supervisor.spawn("pc", |cancel| async move { cancel.cancelled().await });
        let new = supervisor.spawn("pc", |cancel| async move { cancel.cancelled().await });

        old.join().await.unwrap();
        assert!(supervisor.contains("pc"));

        new.cancel();
        new.join().await.unwrap();
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_and_wait() {
        let supervisor = TaskSupervisor::new();
        for i in 0..3 {
            supervisor.spawn(format!("t{i}"), |cancel| async move { cancel.cancelled().await });
        }
        assert_eq!(supervisor.len(), 3);

        supervisor.cancel_all();
        timeout(Duration::from_secs(1), supervisor.wait_all())
            .await
            .expect("all tasks finish after cancellation");
        assert!(supervisor.is_empty());
    }
}
