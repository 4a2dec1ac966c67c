//! Tracked fire-and-forget background tasks.
//!
//! Writebacks run detached from playback. They are still counted so that
//! shutdown and tests can wait for them, and their failures are logged in a
//! single place.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TasksInner {
    pending: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    idle: Notify,
}

/// Registry of detached background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<TasksInner>,
}

/// Decrements the pending count even if the task panics or is aborted.
struct PendingGuard(Arc<TasksInner>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task`, logging its error under `role` if it fails.
    pub fn spawn<F, E>(&self, role: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.inner.clone());
        tokio::spawn(async move {
            let guard = guard;
            match task.await {
                Ok(()) => {
                    guard.0.completed.fetch_add(1, Ordering::AcqRel);
                    debug!(role, "Background task completed");
                }
                Err(e) => {
                    guard.0.failed.fetch_add(1, Ordering::AcqRel);
                    warn!(role, error = %e, "Background task failed");
                }
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> usize {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Resolves once no task is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_counts_outcomes() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("ok", async { Ok::<(), String>(()) });
        tasks.spawn("err", async { Err::<(), String>("boom".to_string()) });
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<(), String>(())
        });

        tokio::time::timeout(Duration::from_secs(5), tasks.wait_idle())
            .await
            .unwrap();
        assert_eq!(tasks.pending(), 0);
        assert_eq!(tasks.completed(), 2);
        assert_eq!(tasks.failed(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_without_tasks() {
        let tasks = BackgroundTasks::new();
        tasks.wait_idle().await;
    }
}
