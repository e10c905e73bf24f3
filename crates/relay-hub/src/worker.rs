//! Bounded pool for detached background work.
//!
//! Follow-up work that must not delay the request that triggered it (marking
//! a chat read, pushing unread counts) is handed to a [`BackgroundPool`].
//! At most `limit` tasks run at once; the rest wait for a permit. Failures
//! are logged and counted, never returned to the caller.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::metrics::BACKGROUND_FAILURES_TOTAL;

/// Cloneable handle to a bounded set of detached tasks.
#[derive(Clone)]
pub struct BackgroundPool {
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    pending: Arc<AtomicUsize>,
    limit: usize,
}

impl BackgroundPool {
    /// Create a pool running at most `limit` tasks concurrently.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            pending: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Spawn `future` without waiting for it.
    ///
    /// An `Err` outcome is logged at `warn` with the `task` label.
    pub fn spawn_detached<F, E>(&self, task: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let pending = Arc::clone(&self.pending);
        let _ = pending.fetch_add(1, Ordering::Relaxed);

        let mut tasks = self.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "background task panicked");
            }
        }
        let _ = tasks.spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                if let Err(e) = future.await {
                    counter!(BACKGROUND_FAILURES_TOTAL, "task" => task).increment(1);
                    warn!(task, error = %e, "background task failed");
                }
            }
            let _ = pending.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Wait for every task spawned so far, up to `timeout`.
    ///
    /// Returns `true` if all of them finished in time. Tasks still running at
    /// the deadline are aborted.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let join_all = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "background task panicked");
                }
            }
        };
        tokio::time::timeout(timeout, join_all).await.is_ok()
    }

    /// Tasks spawned and not yet finished.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl fmt::Debug for BackgroundPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundPool")
            .field("limit", &self.limit)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use tokio::sync::Notify;

    #[tokio::test]
    async fn spawn_and_drain() {
        let pool = BackgroundPool::new(4);
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        pool.spawn_detached("flag", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });

        assert!(pool.drain(Duration::from_secs(1)).await);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(pool.pending_count(), 0);
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let pool = BackgroundPool::new(1);
        pool.spawn_detached("fail", async { Err::<(), _>("boom") });
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert_eq!(pool.pending_count(), 0);
    }

    #[tokio::test]
    async fn limit_bounds_concurrency() {
        let pool = BackgroundPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        for _ in 0..5 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let gate = Arc::clone(&gate);
            pool.spawn_detached("gated", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = peak.fetch_max(now, Ordering::SeqCst);
                gate.notified().await;
                let _ = running.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), String>(())
            });
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(running.load(Ordering::SeqCst), 2);

        for _ in 0..5 {
            gate.notify_one();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drain_times_out() {
        let pool = BackgroundPool::new(1);
        pool.spawn_detached("slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), String>(())
        });
        assert!(!pool.drain(Duration::from_millis(10)).await);
    }

    #[test]
    fn zero_limit_clamped() {
        assert_eq!(BackgroundPool::new(0).limit(), 1);
    }

    #[tokio::test]
    async fn debug_impl() {
        let pool = BackgroundPool::new(3);
        let debug = format!("{pool:?}");
        assert!(debug.contains("BackgroundPool"));
        assert!(debug.contains("limit: 3"));
    }
}
