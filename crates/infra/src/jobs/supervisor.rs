//! Supervised set of per-job polling tasks.
//!
//! Each task is keyed by its request id; at most one task per request id is
//! alive at a time. Every task has a failure observer: errors and panics are
//! logged with the request id at the task boundary.

use std::any::Any;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use vidgen_core::RequestId;

#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tracker: TaskTracker,
    active: Mutex<HashSet<RequestId>>,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, HashSet<RequestId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the request id when the task ends, however it ends.
struct ActiveSlot {
    inner: Arc<Inner>,
    request_id: RequestId,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.inner.active().remove(&self.request_id);
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` for `request_id`.
    ///
    /// Returns `false` without spawning when a task for the same request id is
    /// still running or the supervisor has been closed.
    pub fn spawn<F, E>(&self, request_id: RequestId, task: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        if self.inner.tracker.is_closed() {
            warn!(request_id = %request_id, "supervisor closed; task not started");
            return false;
        }
        if !self.inner.active().insert(request_id.clone()) {
            debug!(request_id = %request_id, "task already running");
            return false;
        }

        let slot = ActiveSlot {
            inner: self.inner.clone(),
            request_id,
        };
        let handle = tokio::spawn(task);

        self.inner.tracker.spawn(async move {
            let request_id = slot.request_id.clone();
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(request_id = %request_id, error = %e, "background task failed");
                }
                Err(join_err) if join_err.is_panic() => {
                    let detail = panic_message(join_err.into_panic());
                    error!(request_id = %request_id, panic = %detail, "background task panicked");
                }
                Err(_) => {
                    warn!(request_id = %request_id, "background task cancelled");
                }
            }
            drop(slot);
        });
        true
    }

    pub fn is_active(&self, request_id: &RequestId) -> bool {
        self.inner.active().contains(request_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active().len()
    }

    /// Stop accepting new tasks. Running tasks are left alone; they end with
    /// the runtime.
    pub fn close(&self) {
        self.inner.tracker.close();
    }

    /// Close and wait for every task to finish.
    pub async fn drain(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn rid(raw: &str) -> RequestId {
        RequestId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn refuses_a_second_task_for_the_same_request() {
        let supervisor = TaskSupervisor::new();
        let (release, wait) = oneshot::channel::<()>();

        assert!(supervisor.spawn(rid("abc"), async move {
            let _ = wait.await;
            Ok::<_, String>(())
        }));
        assert!(supervisor.is_active(&rid("abc")));
        assert!(!supervisor.spawn(rid("abc"), async { Ok::<_, String>(()) }));
        assert_eq!(supervisor.active_count(), 1);

        release.send(()).unwrap();
        supervisor.drain().await;
        assert!(!supervisor.is_active(&rid("abc")));
    }

    #[tokio::test]
    async fn failures_and_panics_stay_inside_the_task() {
        let supervisor = TaskSupervisor::new();
        assert!(supervisor.spawn(rid("err"), async { Err::<(), _>("boom") }));
        assert!(supervisor.spawn(rid("panic"), async {
            if true {
                panic!("poller exploded");
            }
            Ok::<(), String>(())
        }));

        supervisor.drain().await;
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test]
    async fn slot_is_released_for_a_later_task() {
        let supervisor = TaskSupervisor::new();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        assert!(supervisor.spawn(rid("again"), async move {
            let _ = done_tx.send(());
            Ok::<_, String>(())
        }));
        done_rx.await.unwrap();

        // The slot is dropped by the observer after the task returns.
        while supervisor.is_active(&rid("again")) {
            tokio::task::yield_now().await;
        }
        assert!(supervisor.spawn(rid("again"), async { Ok::<_, String>(()) }));
        supervisor.drain().await;
    }

    #[tokio::test]
    async fn closed_supervisor_starts_nothing() {
        let supervisor = TaskSupervisor::new();
        supervisor.close();
        assert!(!supervisor.spawn(rid("late"), async { Ok::<_, String>(()) }));
        assert_eq!(supervisor.active_count(), 0);
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "non-string panic payload");
    }
}
