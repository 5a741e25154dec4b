//! Execution Pool
//!
//! Drain turns are opaque run-once futures handed to an [`Executor`]. The
//! default runs them on the ambient tokio runtime and keeps abort handles so
//! a shutdown can force-terminate turns that outlive the grace period.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// One scheduled drain turn
pub type Task = BoxFuture<'static, ()>;

/// Unordered pool accepting run-once tasks
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);

    /// Cancel every task still running; returns how many were aborted
    fn abort_all(&self) -> usize {
        0
    }
}

/// Executor backed by a tokio runtime handle
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
    running: Arc<DashMap<u64, AbortHandle>>,
    next_id: Arc<AtomicU64>,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            running: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Executor on the runtime the caller is running in
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Tasks submitted and not yet finished
    pub fn running(&self) -> usize {
        self.running.len()
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let join = self.handle.spawn(async move {
            task.await;
            running.remove(&id);
        });

        self.running.insert(id, join.abort_handle());
        // The task may have completed before its handle was recorded.
        if join.is_finished() {
            self.running.remove(&id);
        }
    }

    fn abort_all(&self) -> usize {
        let ids: Vec<u64> = self.running.iter().map(|e| *e.key()).collect();
        let mut aborted = 0;
        for id in ids {
            if let Some((_, handle)) = self.running.remove(&id) {
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_execute_runs_task() {
        let executor = TokioExecutor::try_current().unwrap();
        let (tx, rx) = oneshot::channel();
        executor.execute(Box::pin(async move {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_abort_all_cancels_stuck_tasks() {
        let executor = TokioExecutor::try_current().unwrap();
        for _ in 0..3 {
            executor.execute(Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }));
        }
        tokio::task::yield_now().await;
        assert_eq!(executor.running(), 3);
        assert_eq!(executor.abort_all(), 3);
        assert_eq!(executor.running(), 0);
    }

    #[test]
    fn test_no_runtime() {
        assert!(TokioExecutor::try_current().is_none());
    }
}
