//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates shutdown between `stop`, the accept loop and every
/// connection task.
///
/// `token` is cancelled when shutdown starts; every connection task and the
/// accept loop watch it. `finished` is cancelled by the accept loop once the
/// listening surface has drained.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    finished: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// Get a clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Record that the listening surface has drained.
    pub fn mark_finished(&self) {
        self.finished.cancel();
    }

    /// Whether the listening surface has drained.
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Initiate shutdown and wait up to `timeout` for the listener to drain.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        info!(timeout = ?timeout, "waiting for listener to drain");

        if tokio::time::timeout(timeout, self.finished.cancelled())
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, listener may still be running");
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
