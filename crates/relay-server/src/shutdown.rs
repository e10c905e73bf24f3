//! Stopping the listener and hub actors together.
//!
//! The listener and both hubs hold a clone of one token; when it fires the
//! listener stops accepting upgrades and each hub closes its sessions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait applied when the server config leaves the timeout unset.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared cancellation for the listener and both hub actors.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with the relay still running.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token to hand to the listener or a hub actor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tell the listener and both hubs to stop. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the relay has been told to stop.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the relay, then wait up to `timeout` for the listener and hub
    /// tasks in `handles` to exit.
    ///
    /// Returns `false` if a task was still running at the deadline; those
    /// tasks are aborted and their sessions dropped without a close frame.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for listener and hubs to stop"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("relay tasks still running after {timeout:?}, aborting");
            for abort in aborts {
                abort.abort();
            }
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
